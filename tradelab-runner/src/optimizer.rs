//! Walk-forward optimization.
//!
//! For each window, in chronological order:
//! 1. Run up to `trials` trials on the train slice, each proposed by the
//!    search strategy from the study so far.
//! 2. Pick the best complete trial and run it once, unchanged, on the test
//!    slice. Trials with fewer than two trades are pruned. With several
//!    metrics the pick comes from the Pareto front, ordered by the
//!    tie-breaker metric.
//! 3. Append those out-of-sample trades to the ledger.
//!
//! Failures stay local: a failed trial is recorded and the search goes on; a
//! window without a solution is recorded as `NoSolution` and the next window
//! runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tradelab_core::config::ConfigError;
use tradelab_core::data::{CsvStore, DataError};
use tradelab_core::domain::TradeRecord;
use tradelab_core::params::ParamSet;
use tradelab_core::rng::RngHierarchy;

use crate::config::{DataMode, OptimizeConfig};
use crate::evaluate::{Evaluator, PortfolioRun};
use crate::history::{EagerProvider, HistoryProvider, LazyProvider};
use crate::metrics::{Evaluation, MetricsCalculator, TradeMetrics, TradeMetricsCalculator};
use crate::search::SearchSpace;
use crate::study::{Study, Trial};
use crate::walk_forward::{create_windows, Window};

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("window {window}: no complete trial out of {trials}")]
    SearchExhausted { window: usize, trials: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("failed to build worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

// ─── Report types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Success,
    NoSolution,
}

/// First and last bar timestamps of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
    pub train_span: Option<Span>,
    pub test_span: Option<Span>,
    pub status: WindowStatus,
    pub best_params: Option<ParamSet>,
    pub best_trial: Option<usize>,
    pub in_sample: Option<Evaluation>,
    pub out_of_sample: Option<TradeMetrics>,
    pub oos_trades: usize,
    pub trials_run: usize,
    pub trials_complete: usize,
    pub error: Option<String>,
}

impl WindowReport {
    fn new(window: &Window) -> Self {
        Self {
            index: window.index,
            train: window.train.clone(),
            test: window.test.clone(),
            train_span: None,
            test_span: None,
            status: WindowStatus::NoSolution,
            best_params: None,
            best_trial: None,
            in_sample: None,
            out_of_sample: None,
            oos_trades: 0,
            trials_run: 0,
            trials_complete: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub strategy: String,
    pub instruments: Vec<String>,
    pub windows: Vec<WindowReport>,
    /// Out-of-sample trades of every window, in window order.
    pub ledger: Vec<TradeRecord>,
    pub oos_objective: f64,
    pub oos_metrics: TradeMetrics,
}

impl OptimizationReport {
    pub fn successful_windows(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| w.status == WindowStatus::Success)
            .count()
    }
}

// ─── Entry points ────────────────────────────────────────────────────

/// Open history per `config.data_mode` and optimize.
pub fn optimize(config: &OptimizeConfig) -> Result<OptimizationReport, OptimizeError> {
    config.validate()?;
    let store = CsvStore::new(&config.data_dir);
    match config.data_mode {
        DataMode::Eager => {
            let history = EagerProvider::load(&store, &config.instruments)?;
            run_walk_forward_optimization(config, &history)
        }
        DataMode::Lazy => {
            let history = LazyProvider::open(store, &config.instruments)?;
            run_walk_forward_optimization(config, &history)
        }
    }
}

/// Optimize with the built-in calculator for the primary metric.
pub fn run_walk_forward_optimization(
    config: &OptimizeConfig,
    history: &dyn HistoryProvider,
) -> Result<OptimizationReport, OptimizeError> {
    let calculator = Arc::new(TradeMetricsCalculator::new(config.primary_metric()));
    run_walk_forward_with(config, history, calculator)
}

/// Optimize with a caller-supplied metrics calculator.
///
/// Errors only on configuration problems found before the first window.
pub fn run_walk_forward_with(
    config: &OptimizeConfig,
    history: &dyn HistoryProvider,
    calculator: Arc<dyn MetricsCalculator>,
) -> Result<OptimizationReport, OptimizeError> {
    config.validate()?;
    let space = SearchSpace::for_strategy(&config.strategy, &config.risk, &config.overrides)?;
    let windows = create_windows(history.len(), &config.windows)?;
    let evaluator = Evaluator::new(config.max_workers, config.engine.clone(), Arc::clone(&calculator))?;
    let rng = RngHierarchy::new(config.seed);

    info!(
        strategy = %config.strategy,
        instruments = history.instruments().len(),
        bars = history.len(),
        windows = windows.len(),
        dimensions = space.dims().len(),
        workers = evaluator.workers(),
        "starting walk-forward optimization"
    );

    let optimizer = WindowOptimizer {
        config,
        history,
        evaluator: &evaluator,
        space: &space,
        rng: &rng,
    };

    let mut reports = Vec::with_capacity(windows.len());
    let mut ledger = Vec::new();
    for window in &windows {
        let (report, trades) = optimizer.run(window);
        ledger.extend(trades);
        reports.push(report);
    }

    let oos = calculator.evaluate(&ledger, config.engine.initial_capital);
    let report = OptimizationReport {
        strategy: config.strategy.clone(),
        instruments: history.instruments().to_vec(),
        windows: reports,
        ledger,
        oos_objective: oos.objective,
        oos_metrics: oos.summary,
    };
    info!(
        windows = report.windows.len(),
        successful = report.successful_windows(),
        oos_trades = report.ledger.len(),
        oos_objective = report.oos_objective,
        "walk-forward optimization finished"
    );
    Ok(report)
}

// ─── Per-window loop ─────────────────────────────────────────────────

struct WindowOptimizer<'a> {
    config: &'a OptimizeConfig,
    history: &'a dyn HistoryProvider,
    evaluator: &'a Evaluator,
    space: &'a SearchSpace,
    rng: &'a RngHierarchy,
}

impl WindowOptimizer<'_> {
    /// Never fails: every outcome is recorded in the report.
    fn run(&self, window: &Window) -> (WindowReport, Vec<TradeRecord>) {
        let mut report = WindowReport::new(window);

        match (self.span(&window.train), self.span(&window.test)) {
            (Ok(train), Ok(test)) => {
                report.train_span = train;
                report.test_span = test;
            }
            (Err(err), _) | (_, Err(err)) => {
                error!(window = window.index, error = %err, "window skipped: history unavailable");
                report.error = Some(err.to_string());
                return (report, Vec::new());
            }
        }

        // ─── Phase 1: search the train slice ───
        let study = self.search(window);
        report.trials_run = study.len();
        report.trials_complete = study.count(crate::study::TrialState::Complete);

        let best = match study.best().ok_or(OptimizeError::SearchExhausted {
            window: window.index,
            trials: study.len(),
        }) {
            Ok(best) => best,
            Err(err) => {
                warn!(window = window.index, "{err}");
                report.error = Some(err.to_string());
                return (report, Vec::new());
            }
        };
        report.best_params = Some(best.params.clone());
        report.best_trial = Some(best.index);
        report.in_sample = best.objective.zip(best.summary.clone()).map(|(objective, summary)| Evaluation {
            objective,
            summary,
        });

        // ─── Phase 2: replay the winner on the test slice ───
        let config = self.config.strategy_config(&best.params);
        match self.evaluator.run(&config, self.history, window.test.clone()) {
            Ok(PortfolioRun { trades, evaluation }) => {
                report.status = WindowStatus::Success;
                report.oos_trades = trades.len();
                report.out_of_sample = Some(evaluation.summary);
                info!(
                    window = window.index,
                    best_trial = best.index,
                    in_sample = best.objective.unwrap_or_default(),
                    oos_objective = evaluation.objective,
                    oos_trades = trades.len(),
                    "window done"
                );
                (report, trades)
            }
            Err(err) => {
                warn!(window = window.index, error = %err, "out-of-sample run failed");
                report.error = Some(err.to_string());
                (report, Vec::new())
            }
        }
    }

    fn search(&self, window: &Window) -> Study {
        let metrics = self.config.objectives();
        let mut study = Study::with_selection(window.index, self.config.selection());
        let mut search = self
            .config
            .search
            .build(self.space.clone(), self.rng.clone(), window.index);

        for index in 0..self.config.trials {
            let Some(params) = search.suggest(study.trials()) else {
                debug!(window = window.index, trials = index, search = search.name(), "search exhausted");
                break;
            };
            let config = self.config.strategy_config(&params);
            let trial = match self.evaluator.run(&config, self.history, window.train.clone()) {
                Ok(run) => Trial::evaluated(index, params, run.evaluation, &metrics),
                Err(err) => {
                    warn!(window = window.index, trial = index, error = %err, "trial failed");
                    Trial::failed(index, params, err.to_string())
                }
            };
            debug!(
                window = window.index,
                trial = index,
                state = ?trial.state,
                objective = ?trial.objective,
                "trial finished"
            );
            study.push(trial);
        }
        study
    }

    fn span(&self, range: &Range<usize>) -> Result<Option<Span>, DataError> {
        let Some(first) = self.history.instruments().first() else {
            return Ok(None);
        };
        let bars = self.history.slice(first, range.clone())?;
        Ok(bars.first().zip(bars.last()).map(|(a, b)| Span {
            start: a.timestamp,
            end: b.timestamp,
        }))
    }
}
