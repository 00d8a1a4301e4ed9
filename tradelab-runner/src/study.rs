//! Trials and the per-window study that collects them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use tradelab_core::params::ParamSet;

use crate::metrics::{Evaluation, ObjectiveMetric, TradeMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Complete,
    /// Evaluated without error but traded too little to score (fewer than two trades).
    Pruned,
    /// Configuration or data error during evaluation.
    Failed,
}

/// One candidate parameter assignment and what it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub params: ParamSet,
    pub state: TrialState,
    /// Oriented so higher is better. `None` unless complete.
    pub objective: Option<f64>,
    /// One oriented value per optimized metric; `objective` is the first.
    #[serde(default)]
    pub objectives: Vec<f64>,
    pub summary: Option<TradeMetrics>,
    pub error: Option<String>,
}

impl Trial {
    pub fn complete(index: usize, params: ParamSet, evaluation: Evaluation) -> Self {
        Self {
            index,
            params,
            state: TrialState::Complete,
            objective: Some(evaluation.objective),
            objectives: vec![evaluation.objective],
            summary: Some(evaluation.summary),
            error: None,
        }
    }

    /// Complete when the summary is valid, pruned otherwise.
    ///
    /// With more than one metric, `objectives` holds each metric's oriented
    /// value and the first one becomes `objective`.
    pub fn evaluated(index: usize, params: ParamSet, evaluation: Evaluation, metrics: &[ObjectiveMetric]) -> Self {
        if !evaluation.summary.valid {
            return Self::pruned(index, params);
        }
        let mut trial = Self::complete(index, params, evaluation);
        if metrics.len() > 1 {
            if let Some(summary) = &trial.summary {
                trial.objectives = metrics.iter().map(|m| m.objective(summary)).collect();
                trial.objective = trial.objectives.first().copied();
            }
        }
        trial
    }

    pub fn pruned(index: usize, params: ParamSet) -> Self {
        Self {
            index,
            params,
            state: TrialState::Pruned,
            objective: None,
            objectives: Vec::new(),
            summary: None,
            error: None,
        }
    }

    pub fn failed(index: usize, params: ParamSet, error: impl Into<String>) -> Self {
        Self {
            index,
            params,
            state: TrialState::Failed,
            objective: None,
            objectives: Vec::new(),
            summary: None,
            error: Some(error.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete
    }

    fn drawdown(&self) -> f64 {
        self.summary.as_ref().map_or(f64::INFINITY, |s| s.max_drawdown)
    }
}

/// Selection order: higher objective, then lower drawdown, then earlier index.
///
/// Returns `Ordering::Less` when `a` ranks ahead of `b`.
pub fn rank(a: &Trial, b: &Trial) -> Ordering {
    let oa = a.objective.unwrap_or(f64::NEG_INFINITY);
    let ob = b.objective.unwrap_or(f64::NEG_INFINITY);
    ob.total_cmp(&oa)
        .then_with(|| a.drawdown().total_cmp(&b.drawdown()))
        .then_with(|| a.index.cmp(&b.index))
}

/// Best complete trial of `trials`, if any.
pub fn best_trial(trials: &[Trial]) -> Option<&Trial> {
    trials.iter().filter(|t| t.is_complete()).min_by(|a, b| rank(a, b))
}

// ─── Multi-objective ─────────────────────────────────────────────────

/// `a` is no worse than `b` on every objective and strictly better on one.
/// Both are oriented so higher is better.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| x >= y)
        && a.iter().zip(b).any(|(x, y)| x > y)
}

/// Complete trials no other complete trial dominates, in trial order.
pub fn pareto_front(trials: &[Trial]) -> Vec<&Trial> {
    let complete: Vec<&Trial> = trials.iter().filter(|t| t.is_complete()).collect();
    complete
        .iter()
        .filter(|t| !complete.iter().any(|o| dominates(&o.objectives, &t.objectives)))
        .copied()
        .collect()
}

/// Pick from the Pareto front by `tie_breaker`, then lower drawdown, then
/// earlier index.
pub fn select_from_front(trials: &[Trial], tie_breaker: ObjectiveMetric) -> Option<&Trial> {
    let score = |t: &Trial| t.summary.as_ref().map_or(f64::NEG_INFINITY, |s| tie_breaker.objective(s));
    pareto_front(trials).into_iter().min_by(|a, b| {
        score(b)
            .total_cmp(&score(a))
            .then_with(|| a.drawdown().total_cmp(&b.drawdown()))
            .then_with(|| a.index.cmp(&b.index))
    })
}

/// How a study picks its winner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Selection {
    /// Highest single objective.
    #[default]
    Single,
    /// Pareto front over every objective, then the tie-breaker metric.
    Pareto { tie_breaker: ObjectiveMetric },
}

impl Selection {
    pub fn for_metrics(metrics: &[ObjectiveMetric], tie_breaker: ObjectiveMetric) -> Self {
        if metrics.len() > 1 {
            Self::Pareto { tie_breaker }
        } else {
            Self::Single
        }
    }

    pub fn select<'a>(&self, trials: &'a [Trial]) -> Option<&'a Trial> {
        match self {
            Self::Single => best_trial(trials),
            Self::Pareto { tie_breaker } => select_from_front(trials, *tie_breaker),
        }
    }
}

/// Ordered trial history for one optimization window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Study {
    pub window: usize,
    pub selection: Selection,
    trials: Vec<Trial>,
}

impl Study {
    pub fn new(window: usize) -> Self {
        Self::with_selection(window, Selection::Single)
    }

    pub fn with_selection(window: usize, selection: Selection) -> Self {
        Self {
            window,
            selection,
            trials: Vec::new(),
        }
    }

    pub fn push(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn best(&self) -> Option<&Trial> {
        self.selection.select(&self.trials)
    }

    /// Non-dominated complete trials.
    pub fn pareto_front(&self) -> Vec<&Trial> {
        pareto_front(&self.trials)
    }

    /// Complete trials, best first by the primary objective.
    pub fn leaderboard(&self, n: usize) -> Vec<&Trial> {
        let mut complete: Vec<&Trial> = self.trials.iter().filter(|t| t.is_complete()).collect();
        complete.sort_by(|a, b| rank(a, b));
        complete.truncate(n);
        complete
    }

    pub fn count(&self, state: TrialState) -> usize {
        self.trials.iter().filter(|t| t.state == state).count()
    }
}
