//! Portfolio-level evaluation of one configuration over one bar range.
//!
//! Each instrument runs on its own worker with its own engine and an equal
//! share of capital. Workers share nothing but read-only bar slices; results
//! meet at the `collect` barrier.

use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

use tradelab_core::config::StrategyConfig;
use tradelab_core::domain::TradeRecord;
use tradelab_core::engine::{run_backtest_on_bars, EngineConfig};
use tradelab_core::strategy::build_strategy;

use crate::history::HistoryProvider;
use crate::metrics::{Evaluation, MetricsCalculator};
use crate::runner::RunError;

/// Merged trade log of every instrument plus its portfolio-level score.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRun {
    pub trades: Vec<TradeRecord>,
    pub evaluation: Evaluation,
}

/// Chronological by exit, then instrument, then entry.
pub fn sort_trades(trades: &mut [TradeRecord]) {
    trades.sort_by(|a, b| {
        a.exit_timestamp
            .cmp(&b.exit_timestamp)
            .then_with(|| a.instrument.cmp(&b.instrument))
            .then_with(|| a.entry_timestamp.cmp(&b.entry_timestamp))
    });
}

pub struct Evaluator {
    pool: rayon::ThreadPool,
    engine: EngineConfig,
    calculator: Arc<dyn MetricsCalculator>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("workers", &self.pool.current_num_threads())
            .field("engine", &self.engine)
            .finish()
    }
}

impl Evaluator {
    /// `max_workers` of 0 means available parallelism.
    pub fn new(
        max_workers: usize,
        engine: EngineConfig,
        calculator: Arc<dyn MetricsCalculator>,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("tradelab-eval-{i}"))
            .build()?;
        Ok(Self {
            pool,
            engine,
            calculator,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Run `config` on every instrument of `history` over `range`.
    ///
    /// `config.instrument` is replaced per worker. The first failing
    /// instrument fails the whole run.
    pub fn run(
        &self,
        config: &StrategyConfig,
        history: &dyn HistoryProvider,
        range: Range<usize>,
    ) -> Result<PortfolioRun, RunError> {
        let instruments = history.instruments();
        let share = self.engine.initial_capital / instruments.len().max(1) as f64;
        let engine = self.engine.clone().with_capital(share);

        let per_instrument: Vec<Vec<TradeRecord>> = self.pool.install(|| {
            instruments
                .par_iter()
                .map(|instrument| -> Result<Vec<TradeRecord>, RunError> {
                    let mut scoped = config.clone();
                    scoped.instrument = instrument.clone();
                    let strategy = build_strategy(&scoped)?;
                    let bars = history.slice(instrument, range.clone())?;
                    let result = run_backtest_on_bars(&strategy, &bars, &engine)?;
                    Ok(result.trades)
                })
                .collect::<Result<_, RunError>>()
        })?;

        let mut trades: Vec<TradeRecord> = per_instrument.into_iter().flatten().collect();
        sort_trades(&mut trades);
        let evaluation = self.calculator.evaluate(&trades, self.engine.initial_capital);
        debug!(
            strategy = %config.strategy_id,
            start = range.start,
            end = range.end,
            trades = trades.len(),
            objective = evaluation.objective,
            "portfolio evaluated"
        );
        Ok(PortfolioRun { trades, evaluation })
    }
}
