//! Backtest runner: wires together the strategy registry, the engine and
//! the metrics calculator.
//!
//! Two entry points:
//! - `run_single_backtest()`: loads bars from the CSV store, then runs. Used by the CLI.
//! - `run_backtest_from_bars()`: takes pre-loaded bars. Used by the optimizer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use tradelab_core::config::{ConfigError, StrategyConfig};
use tradelab_core::data::{CsvStore, DataError};
use tradelab_core::domain::Bar;
use tradelab_core::engine::{run_backtest_on_bars, BacktestResult, EngineConfig};
use tradelab_core::strategy::build_strategy;

use crate::metrics::{MetricsCalculator, ObjectiveMetric, TradeMetrics, TradeMetricsCalculator};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// A finished backtest plus its summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub config: StrategyConfig,
    pub metric: ObjectiveMetric,
    pub objective: f64,
    pub metrics: TradeMetrics,
    pub result: BacktestResult,
}

/// Load `config.instrument` from `store` and run it over the full history.
pub fn run_single_backtest(
    config: &StrategyConfig,
    store: &CsvStore,
    engine: &EngineConfig,
    metric: ObjectiveMetric,
) -> Result<BacktestReport, RunError> {
    let bars = store.load(&config.instrument)?;
    info!(
        instrument = %config.instrument,
        strategy = %config.strategy_id,
        bars = bars.len(),
        "running backtest"
    );
    run_backtest_from_bars(config, &bars, engine, metric)
}

/// Run a backtest over pre-loaded bars. No I/O.
pub fn run_backtest_from_bars(
    config: &StrategyConfig,
    bars: &[Bar],
    engine: &EngineConfig,
    metric: ObjectiveMetric,
) -> Result<BacktestReport, RunError> {
    let strategy = build_strategy(config)?;
    let result = run_backtest_on_bars(&strategy, bars, engine)?;
    let evaluation = TradeMetricsCalculator::new(metric).evaluate(&result.trades, engine.initial_capital);
    debug!(
        identity = %config.identity(),
        trades = result.trades.len(),
        objective = evaluation.objective,
        "backtest finished"
    );
    Ok(BacktestReport {
        config: config.clone(),
        metric,
        objective: evaluation.objective,
        metrics: evaluation.summary,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tradelab_core::params::ParamValue;

    fn wave(n: usize) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.15).sin() * 8.0;
                Bar::new("ETHUSDT", base + Duration::hours(i as i64), close, close + 1.0, close - 1.0, close, 5_000.0)
            })
            .collect()
    }

    fn config() -> StrategyConfig {
        let mut config = StrategyConfig::new("sma_cross", "ETHUSDT");
        config.params.insert("sma_period".into(), ParamValue::Int(10));
        config
    }

    #[test]
    fn store_and_bars_paths_agree() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let bars = wave(300);
        store.write("ETHUSDT", &bars).unwrap();

        let engine = EngineConfig::default();
        let from_store = run_single_backtest(&config(), &store, &engine, ObjectiveMetric::Pnl).unwrap();
        let from_bars = run_backtest_from_bars(&config(), &bars, &engine, ObjectiveMetric::Pnl).unwrap();
        assert_eq!(from_store.result.trades, from_bars.result.trades);
        assert_eq!(from_store.objective.to_bits(), from_bars.objective.to_bits());
        assert!(!from_bars.result.trades.is_empty());
    }

    #[test]
    fn missing_instrument_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let err = run_single_backtest(&config(), &store, &EngineConfig::default(), ObjectiveMetric::Pnl).unwrap_err();
        assert!(matches!(err, RunError::Data(DataError::NotFound { .. })));
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let config = StrategyConfig::new("nope", "ETHUSDT");
        let err = run_backtest_from_bars(&config, &wave(50), &EngineConfig::default(), ObjectiveMetric::Pnl).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::UnknownStrategy(_))));
    }
}
