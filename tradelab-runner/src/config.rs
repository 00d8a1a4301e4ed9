//! Optimization run configuration, read from TOML.
//!
//! ```toml
//! strategy = "triple_filter"
//! instruments = ["BTCUSDT", "ETHUSDT"]
//! data_dir = "data"
//! trials = 40
//! metric = "calmar"
//! # Several metrics optimize jointly; the winner comes from the Pareto
//! # front, picked by `tie_breaker`.
//! # metrics = ["sharpe", "win_rate"]
//! # tie_breaker = "calmar"
//! data_mode = "lazy"
//!
//! [windows]
//! train_len = 600
//! test_len = 200
//! step = 200
//!
//! [search]
//! kind = "adaptive"
//! n_startup = 10
//!
//! [risk]
//! type = "ATR"
//!
//! [overrides]
//! ema_fast_period = { low = 5, high = 20 }
//! rm_atr_period = 14
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tradelab_core::config::{ConfigError, StrategyConfig};
use tradelab_core::engine::EngineConfig;
use tradelab_core::params::ParamSet;
use tradelab_core::risk::RiskConfig;

use crate::metrics::ObjectiveMetric;
use crate::search::{RangeOverride, SearchConfig};
use crate::study::Selection;
use crate::walk_forward::WindowConfig;

/// How instrument history reaches the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Load everything up front.
    #[default]
    Eager,
    /// Read each window's slice on demand.
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeConfig {
    pub strategy: String,
    pub instruments: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub windows: WindowConfig,
    /// Trial budget per window.
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub metric: ObjectiveMetric,
    /// Jointly optimized metrics. Empty means `metric` alone.
    #[serde(default)]
    pub metrics: Vec<ObjectiveMetric>,
    /// Picks one trial from the Pareto front when `metrics` has several entries.
    #[serde(default)]
    pub tie_breaker: ObjectiveMetric,
    /// Worker threads for instrument evaluation. 0 = available parallelism.
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default)]
    pub data_mode: DataMode,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    /// Base values for non-searched parameters.
    #[serde(default)]
    pub params: ParamSet,
    #[serde(default)]
    pub overrides: BTreeMap<String, RangeOverride>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_trials() -> usize {
    50
}

fn default_seed() -> u64 {
    42
}

impl OptimizeConfig {
    pub fn new(strategy: impl Into<String>, instruments: Vec<String>) -> Self {
        Self {
            strategy: strategy.into(),
            instruments,
            data_dir: default_data_dir(),
            interval: None,
            windows: WindowConfig::default(),
            trials: default_trials(),
            search: SearchConfig::default(),
            metric: ObjectiveMetric::default(),
            metrics: Vec::new(),
            tie_breaker: ObjectiveMetric::default(),
            max_workers: 0,
            data_mode: DataMode::default(),
            seed: default_seed(),
            engine: EngineConfig::default(),
            risk: RiskConfig::default(),
            params: ParamSet::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("at least one instrument is required".into()));
        }
        if let Some(dup) = first_duplicate(&self.instruments) {
            return Err(ConfigError::Invalid(format!("instrument '{dup}' listed more than once")));
        }
        if let Some(dup) = first_duplicate(&self.metrics) {
            return Err(ConfigError::Invalid(format!("metric '{dup}' listed more than once")));
        }
        if self.trials == 0 {
            return Err(ConfigError::Invalid("trials must be positive".into()));
        }
        if self.engine.initial_capital.is_nan() || self.engine.initial_capital <= 0.0 {
            return Err(ConfigError::Invalid("initial capital must be positive".into()));
        }
        self.windows.validate()?;
        self.risk.validate()
    }

    /// Metrics the study optimizes, primary first.
    pub fn objectives(&self) -> Vec<ObjectiveMetric> {
        if self.metrics.is_empty() {
            vec![self.metric]
        } else {
            self.metrics.clone()
        }
    }

    /// Metric behind the scalar objective of trials and the out-of-sample ledger.
    pub fn primary_metric(&self) -> ObjectiveMetric {
        self.metrics.first().copied().unwrap_or(self.metric)
    }

    pub fn selection(&self) -> Selection {
        Selection::for_metrics(&self.objectives(), self.tie_breaker)
    }

    /// Strategy config with the base parameters and `params` layered on top.
    /// The instrument is filled in per worker.
    pub fn strategy_config(&self, params: &ParamSet) -> StrategyConfig {
        let mut merged = self.params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut config = StrategyConfig::new(&self.strategy, "")
            .with_params(merged)
            .with_risk(self.risk.clone());
        config.interval = self.interval.clone();
        config
    }
}

fn first_duplicate<T: PartialEq + fmt::Display>(items: &[T]) -> Option<&T> {
    items
        .iter()
        .enumerate()
        .find(|(i, item)| items[..*i].contains(*item))
        .map(|(_, item)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradelab_core::params::ParamValue;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = OptimizeConfig::from_toml_str(
            r#"
            strategy = "sma_cross"
            instruments = ["BTCUSDT"]
            "#,
        )
        .unwrap();
        assert_eq!(config.windows, WindowConfig::default());
        assert_eq!(config.trials, 50);
        assert_eq!(config.search, SearchConfig::Random);
        assert_eq!(config.metric, ObjectiveMetric::Calmar);
        assert_eq!(config.data_mode, DataMode::Eager);
    }

    #[test]
    fn full_config_parses() {
        let config = OptimizeConfig::from_toml_str(
            r#"
            strategy = "triple_filter"
            instruments = ["BTCUSDT", "ETHUSDT"]
            data_dir = "fixtures"
            trials = 12
            metric = "sharpe"
            data_mode = "lazy"
            max_workers = 2

            [windows]
            train_len = 300
            test_len = 100
            step = 100

            [search]
            kind = "adaptive"
            n_startup = 4

            [risk]
            type = "ATR"

            [engine]
            initial_capital = 10000.0

            [overrides]
            ema_fast_period = { low = 5, high = 20 }
            rm_atr_period = 14
            "#,
        )
        .unwrap();
        assert_eq!(config.windows.train_len, 300);
        assert_eq!(config.search, SearchConfig::Adaptive { n_startup: 4, max_step: 2 });
        assert_eq!(config.metric, ObjectiveMetric::Sharpe);
        assert_eq!(config.engine.initial_capital, 10_000.0);
        assert_eq!(config.overrides["rm_atr_period"], RangeOverride::Pin(ParamValue::Int(14)));
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(OptimizeConfig::from_toml_str("strategy = \"sma_cross\"\ninstruments = []").is_err());
        let bad_step = "strategy = \"sma_cross\"\ninstruments = [\"A\"]\n[windows]\ntest_len = 100\nstep = 50";
        assert!(matches!(
            OptimizeConfig::from_toml_str(bad_step),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn strategy_config_layers_params() {
        let mut config = OptimizeConfig::new("sma_cross", vec!["A".into()]);
        config.params.insert("sma_period".into(), ParamValue::Int(30));
        let mut trial = ParamSet::new();
        trial.insert("sma_period".into(), ParamValue::Int(15));
        trial.insert("rm_tp_ratio".into(), ParamValue::Float(3.0));
        let built = config.strategy_config(&trial);
        assert_eq!(built.params["sma_period"], ParamValue::Int(15));
        assert_eq!(built.params.len(), 2);
    }

    #[test]
    fn duplicate_instruments_rejected() {
        let text = "strategy = \"sma_cross\"\ninstruments = [\"AAA\", \"BBB\", \"AAA\"]";
        match OptimizeConfig::from_toml_str(text) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("AAA")),
            other => panic!("expected Invalid, got {other:?}"),
        }
        let dup_metrics = "strategy = \"sma_cross\"\ninstruments = [\"A\"]\nmetrics = [\"sharpe\", \"sharpe\"]";
        assert!(matches!(
            OptimizeConfig::from_toml_str(dup_metrics),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn several_metrics_select_from_pareto_front() {
        let config = OptimizeConfig::from_toml_str(
            r#"
            strategy = "sma_cross"
            instruments = ["A"]
            metrics = ["sharpe", "win_rate"]
            "#,
        )
        .unwrap();
        assert_eq!(config.objectives(), vec![ObjectiveMetric::Sharpe, ObjectiveMetric::WinRate]);
        assert_eq!(config.primary_metric(), ObjectiveMetric::Sharpe);
        assert_eq!(
            config.selection(),
            Selection::Pareto {
                tie_breaker: ObjectiveMetric::Calmar
            }
        );

        let single = OptimizeConfig::new("sma_cross", vec!["A".into()]);
        assert_eq!(single.objectives(), vec![ObjectiveMetric::Calmar]);
        assert_eq!(single.selection(), Selection::Single);
    }
}
