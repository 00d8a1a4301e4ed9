//! Parameter search: the discretized search space and the strategies that
//! walk it.
//!
//! Every numeric parameter becomes a dimension of evenly spaced levels. A
//! search strategy proposes one assignment per trial from the study history
//! alone; returning `None` ends the window's trial loop.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tradelab_core::config::ConfigError;
use tradelab_core::params::{ParamKind, ParamSet, ParamSpec, ParamValue};
use tradelab_core::risk::{RiskConfig, RISK_PARAM_PREFIX};
use tradelab_core::rng::RngHierarchy;
use tradelab_core::strategy::registry;

use crate::study::{best_trial, Trial};

// ─── Search space ────────────────────────────────────────────────────

/// Config-file override of one parameter: pin it, or replace its range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeOverride {
    Range {
        low: f64,
        high: f64,
        #[serde(default)]
        step: Option<f64>,
    },
    Pin(ParamValue),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Levels {
    Int { low: i64, step: i64, count: usize },
    Float { low: f64, step: f64, count: usize },
}

/// One searchable parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub levels: Levels,
}

impl Dimension {
    fn from_kind(name: &str, kind: &ParamKind) -> Result<Self, ConfigError> {
        let levels = match *kind {
            ParamKind::Int { low, high, step } => {
                if step <= 0 || high < low {
                    return Err(invalid_range(name));
                }
                Levels::Int {
                    low,
                    step,
                    count: ((high - low) / step) as usize + 1,
                }
            }
            ParamKind::Float { low, high, step } => {
                if step.is_nan() || step <= 0.0 || !low.is_finite() || !high.is_finite() || high < low {
                    return Err(invalid_range(name));
                }
                Levels::Float {
                    low,
                    step,
                    count: ((high - low) / step + 1e-9).floor() as usize + 1,
                }
            }
            ParamKind::Text => {
                return Err(ConfigError::InvalidParam {
                    name: name.to_string(),
                    reason: "text parameters can only be pinned".into(),
                })
            }
        };
        Ok(Self {
            name: name.to_string(),
            levels,
        })
    }

    pub fn len(&self) -> usize {
        match self.levels {
            Levels::Int { count, .. } | Levels::Float { count, .. } => count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at level `i`, clamped to the last level.
    pub fn value_at(&self, i: usize) -> ParamValue {
        let i = i.min(self.len().saturating_sub(1));
        match self.levels {
            Levels::Int { low, step, .. } => ParamValue::Int(low + step * i as i64),
            Levels::Float { low, step, .. } => {
                let v = low + step * i as f64;
                ParamValue::Float((v * 1e10).round() / 1e10)
            }
        }
    }

    /// Nearest level index for `value`.
    pub fn index_of(&self, value: &ParamValue) -> Option<usize> {
        let v = value.as_f64()?;
        let (low, step) = match self.levels {
            Levels::Int { low, step, .. } => (low as f64, step as f64),
            Levels::Float { low, step, .. } => (low, step),
        };
        let i = ((v - low) / step).round();
        (i >= 0.0).then(|| (i as usize).min(self.len().saturating_sub(1)))
    }
}

fn invalid_range(name: &str) -> ConfigError {
    ConfigError::InvalidParam {
        name: name.to_string(),
        reason: "range needs low <= high and a positive step".into(),
    }
}

/// Searchable dimensions plus values pinned by configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchSpace {
    dims: Vec<Dimension>,
    pinned: ParamSet,
}

impl SearchSpace {
    /// Space for `strategy_id` with `risk`: the strategy's optimizable specs,
    /// then the risk manager's under the `rm_` prefix, with `overrides` applied.
    pub fn for_strategy(
        strategy_id: &str,
        risk: &RiskConfig,
        overrides: &BTreeMap<String, RangeOverride>,
    ) -> Result<Self, ConfigError> {
        let descriptor = registry::lookup(strategy_id)?;
        let mut specs: Vec<ParamSpec> = (descriptor.param_specs)();
        specs.extend(risk.param_specs().into_iter().map(|mut spec| {
            spec.name = format!("{RISK_PARAM_PREFIX}{}", spec.name);
            spec
        }));
        Self::from_specs(&specs, overrides)
    }

    pub fn from_specs(
        specs: &[ParamSpec],
        overrides: &BTreeMap<String, RangeOverride>,
    ) -> Result<Self, ConfigError> {
        if let Some(unknown) = overrides.keys().find(|k| !specs.iter().any(|s| &s.name == *k)) {
            return Err(ConfigError::UnknownParam(unknown.clone()));
        }

        let mut space = SearchSpace::default();
        for spec in specs {
            match overrides.get(&spec.name) {
                Some(RangeOverride::Pin(value)) => {
                    spec.check(value)?;
                    space.pinned.insert(spec.name.clone(), value.clone());
                }
                Some(RangeOverride::Range { low, high, step }) => {
                    let kind = match spec.kind {
                        ParamKind::Int { step: default_step, .. } => ParamKind::Int {
                            low: low.round() as i64,
                            high: high.round() as i64,
                            step: step.map_or(default_step, |s| s.round() as i64),
                        },
                        ParamKind::Float { step: default_step, .. } => ParamKind::Float {
                            low: *low,
                            high: *high,
                            step: step.unwrap_or(default_step),
                        },
                        ParamKind::Text => ParamKind::Text,
                    };
                    space.dims.push(Dimension::from_kind(&spec.name, &kind)?);
                }
                None if spec.optimizable => {
                    space.dims.push(Dimension::from_kind(&spec.name, &spec.kind)?);
                }
                None => {}
            }
        }
        Ok(space)
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn pinned(&self) -> &ParamSet {
        &self.pinned
    }

    /// Number of grid points, saturating.
    pub fn grid_size(&self) -> usize {
        self.dims.iter().fold(1usize, |acc, d| acc.saturating_mul(d.len()))
    }

    /// Full assignment for one level index per dimension.
    pub fn assignment(&self, levels: &[usize]) -> ParamSet {
        let mut params = self.pinned.clone();
        for (dim, &i) in self.dims.iter().zip(levels) {
            params.insert(dim.name.clone(), dim.value_at(i));
        }
        params
    }

    /// Level indices of `params` along each dimension.
    pub fn levels_of(&self, params: &ParamSet) -> Vec<usize> {
        self.dims
            .iter()
            .map(|d| params.get(&d.name).and_then(|v| d.index_of(v)).unwrap_or(0))
            .collect()
    }

    fn random_levels(&self, rng: &mut StdRng) -> Vec<usize> {
        self.dims.iter().map(|d| rng.gen_range(0..d.len().max(1))).collect()
    }
}

// ─── Strategies ──────────────────────────────────────────────────────

/// Chooses the next assignment from the study so far.
pub trait SearchStrategy: Send {
    fn name(&self) -> &'static str;

    /// Next assignment, or `None` when the strategy has nothing left to try.
    fn suggest(&mut self, history: &[Trial]) -> Option<ParamSet>;
}

/// Search strategy as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchConfig {
    Grid,
    Random,
    Adaptive {
        #[serde(default = "default_n_startup")]
        n_startup: usize,
        #[serde(default = "default_max_step")]
        max_step: usize,
    },
}

fn default_n_startup() -> usize {
    10
}

fn default_max_step() -> usize {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig::Random
    }
}

impl SearchConfig {
    /// Fresh strategy for one window.
    pub fn build(&self, space: SearchSpace, rng: RngHierarchy, window: usize) -> Box<dyn SearchStrategy> {
        match *self {
            SearchConfig::Grid => Box::new(GridSearch::new(space)),
            SearchConfig::Random => Box::new(RandomSearch::new(space, rng, window)),
            SearchConfig::Adaptive { n_startup, max_step } => {
                Box::new(AdaptiveSearch::new(space, rng, window, n_startup, max_step))
            }
        }
    }
}

/// Cartesian product in mixed-radix order, last dimension fastest.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: SearchSpace,
}

impl GridSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn suggest(&mut self, history: &[Trial]) -> Option<ParamSet> {
        let mut n = history.len();
        if n >= self.space.grid_size() {
            return None;
        }
        let mut levels = vec![0; self.space.dims.len()];
        for (slot, dim) in levels.iter_mut().zip(&self.space.dims).rev() {
            *slot = n % dim.len();
            n /= dim.len();
        }
        Some(self.space.assignment(&levels))
    }
}

/// Uniform draws over the levels, one sub-seed per (window, trial).
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: RngHierarchy,
    window: usize,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, rng: RngHierarchy, window: usize) -> Self {
        Self { space, rng, window }
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn suggest(&mut self, history: &[Trial]) -> Option<ParamSet> {
        let mut rng = self.rng.rng_for("random", self.window, history.len());
        Some(self.space.assignment(&self.space.random_levels(&mut rng)))
    }
}

/// Random exploration, then local perturbation around the best trial.
#[derive(Debug, Clone)]
pub struct AdaptiveSearch {
    space: SearchSpace,
    rng: RngHierarchy,
    window: usize,
    n_startup: usize,
    max_step: usize,
}

const PERTURB_ATTEMPTS: usize = 16;

impl AdaptiveSearch {
    pub fn new(space: SearchSpace, rng: RngHierarchy, window: usize, n_startup: usize, max_step: usize) -> Self {
        Self {
            space,
            rng,
            window,
            n_startup,
            max_step: max_step.max(1),
        }
    }

    fn perturb(&self, center: &[usize], rng: &mut StdRng) -> Vec<usize> {
        let k = self.max_step as i64;
        center
            .iter()
            .zip(&self.space.dims)
            .map(|(&c, dim)| {
                let shifted = c as i64 + rng.gen_range(-k..=k);
                shifted.clamp(0, dim.len() as i64 - 1) as usize
            })
            .collect()
    }
}

impl SearchStrategy for AdaptiveSearch {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn suggest(&mut self, history: &[Trial]) -> Option<ParamSet> {
        let mut rng = self.rng.rng_for("adaptive", self.window, history.len());
        let best = best_trial(history).filter(|_| history.len() >= self.n_startup);
        let Some(best) = best else {
            return Some(self.space.assignment(&self.space.random_levels(&mut rng)));
        };

        let center = self.space.levels_of(&best.params);
        let mut candidate = self.perturb(&center, &mut rng);
        for _ in 1..PERTURB_ATTEMPTS {
            let params = self.space.assignment(&candidate);
            if !history.iter().any(|t| t.params == params) {
                return Some(params);
            }
            candidate = self.perturb(&center, &mut rng);
        }
        Some(self.space.assignment(&candidate))
    }
}
