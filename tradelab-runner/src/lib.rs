//! TradeLab Runner: backtest orchestration, metrics, walk-forward optimization.
//!
//! This crate builds on `tradelab-core` to provide:
//! - Single-backtest runner over the CSV bar store
//! - Trade-based metrics and the objective registry
//! - Walk-forward windows, parameter search spaces and search strategies
//! - Parallel per-instrument evaluation on a bounded worker pool
//! - Eager and lazy history providers behind one interface
//! - The walk-forward optimizer and its out-of-sample ledger

pub mod config;
pub mod evaluate;
pub mod history;
pub mod metrics;
pub mod optimizer;
pub mod runner;
pub mod search;
pub mod study;
pub mod walk_forward;

pub use config::{DataMode, OptimizeConfig};
pub use evaluate::{sort_trades, Evaluator, PortfolioRun};
pub use history::{BarSlice, EagerProvider, HistoryProvider, LazyProvider};
pub use metrics::{Evaluation, MetricDirection, MetricsCalculator, ObjectiveMetric, TradeMetrics, TradeMetricsCalculator};
pub use optimizer::{
    optimize, run_walk_forward_optimization, run_walk_forward_with, OptimizationReport, OptimizeError, Span,
    WindowReport, WindowStatus,
};
pub use runner::{run_backtest_from_bars, run_single_backtest, BacktestReport, RunError};
pub use search::{
    AdaptiveSearch, Dimension, GridSearch, RandomSearch, RangeOverride, SearchConfig, SearchSpace, SearchStrategy,
};
pub use study::{pareto_front, Selection, Study, Trial, TrialState};
pub use walk_forward::{create_windows, Window, WindowConfig};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn metric_types_are_send_sync() {
        assert_send::<TradeMetrics>();
        assert_sync::<TradeMetrics>();
        assert_send::<TradeMetricsCalculator>();
        assert_sync::<TradeMetricsCalculator>();
        assert_send::<Evaluation>();
        assert_sync::<Evaluation>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<OptimizeConfig>();
        assert_sync::<OptimizeConfig>();
        assert_send::<WindowConfig>();
        assert_sync::<WindowConfig>();
        assert_send::<SearchConfig>();
        assert_sync::<SearchConfig>();
    }

    #[test]
    fn history_providers_are_send_sync() {
        assert_send::<EagerProvider>();
        assert_sync::<EagerProvider>();
        assert_send::<LazyProvider>();
        assert_sync::<LazyProvider>();
        assert_send::<BarSlice>();
        assert_sync::<BarSlice>();
    }

    #[test]
    fn search_and_study_are_send() {
        assert_send::<GridSearch>();
        assert_send::<RandomSearch>();
        assert_send::<AdaptiveSearch>();
        assert_send::<Box<dyn SearchStrategy>>();
        assert_send::<Study>();
        assert_sync::<Study>();
    }

    #[test]
    fn evaluator_and_reports_are_send_sync() {
        assert_send::<Evaluator>();
        assert_sync::<Evaluator>();
        assert_send::<OptimizationReport>();
        assert_sync::<OptimizationReport>();
        assert_send::<BacktestReport>();
        assert_sync::<BacktestReport>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<OptimizeError>();
        assert_sync::<OptimizeError>();
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
