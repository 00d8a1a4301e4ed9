//! Deterministic event engine: bar-by-bar, four fixed phases per bar.
//!
//! 1. Pending-order resolution: orders deferred on the previous bar fill
//! 2. Protective-exit check: SL/TP breaches become exit orders
//! 3. Strategy evaluation: at most one signal
//! 4. Event-queue drain: Signal → Order → Fill until the queue is empty
//!
//! Identical bars, strategy, parameters and cost model always yield identical
//! trade logs.

pub mod accounting;
pub mod event;
pub mod event_loop;
pub mod execution;
pub mod portfolio_update;
pub mod state;

pub use accounting::{max_drawdown, EquityPoint, EquityTracker};
pub use event::{Event, EventQueue, Phase, TraceEntry, TraceKind};
pub use event_loop::BacktestEngine;
pub use execution::{ExecutionError, ExecutionHandler, SimulatedExecution};
pub use portfolio_update::{apply_fill, order_for_signal, protective_order, IgnoreReason, SignalOutcome};
pub use state::{BacktestResult, EngineConfig, FillTiming, IdGen, RunStats, SlippageModel};

use tracing::debug;

use crate::data::{validate_sequence, DataError, DataProvider};
use crate::domain::Bar;
use crate::strategy::{ConfiguredStrategy, Strategy};

/// Drain `provider`, enrich the bars for `strategy`, and run the engine.
pub fn run_backtest(
    strategy: &ConfiguredStrategy,
    provider: &mut dyn DataProvider,
    config: &EngineConfig,
) -> Result<BacktestResult, DataError> {
    let mut bars = Vec::new();
    while let Some(bar) = provider.next()? {
        bars.push(bar);
    }
    run_backtest_on_bars(strategy, &bars, config)
}

/// Validate and run over raw bars already in memory.
pub fn run_backtest_on_bars(
    strategy: &ConfiguredStrategy,
    bars: &[Bar],
    config: &EngineConfig,
) -> Result<BacktestResult, DataError> {
    validate_sequence(strategy.instrument(), bars)?;
    let enriched = strategy.process_data(bars);
    let execution = SimulatedExecution::from_config(config);
    debug!(
        strategy = strategy.id(),
        instrument = strategy.instrument(),
        bars = enriched.len(),
        "backtest started"
    );
    Ok(BacktestEngine::new(config, strategy, &execution).run(&enriched))
}

/// Like [`run_backtest_on_bars`] but with the per-phase trace recorded.
pub fn run_backtest_traced(
    strategy: &ConfiguredStrategy,
    bars: &[Bar],
    config: &EngineConfig,
) -> Result<BacktestResult, DataError> {
    validate_sequence(strategy.instrument(), bars)?;
    let enriched = strategy.process_data(bars);
    let execution = SimulatedExecution::from_config(config);
    Ok(BacktestEngine::new(config, strategy, &execution)
        .with_trace()
        .run(&enriched))
}
