//! Strategy configuration and its identity.
//!
//! - `StrategyConfig`: strategy id, instrument, parameters, risk manager, interval.
//! - `StrategyIdentity`: what reconciliation compares (id + instrument + params hash).
//! - `ConfigError`: any reason a configuration cannot be built.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::ConfigHash;
use crate::params::ParamSet;
use crate::risk::RiskConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("unknown parameter '{0}'")]
    UnknownParam(String),

    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// One strategy instance on one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy_id: String,
    pub instrument: String,
    /// Candle interval label, e.g. "1hour". Informational outside the live feed.
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub params: ParamSet,
    #[serde(default)]
    pub risk: RiskConfig,
}

/// Identity used for set comparison during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrategyIdentity {
    pub strategy_id: String,
    pub instrument: String,
    pub params_hash: ConfigHash,
}

impl fmt::Display for StrategyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.strategy_id,
            self.instrument,
            self.params_hash.short()
        )
    }
}

/// Hashed part of a config besides id/instrument. Kept separate so adding
/// display-only fields never perturbs identity.
#[derive(Serialize)]
struct HashedParams<'a> {
    params: &'a ParamSet,
    risk: &'a RiskConfig,
    interval: &'a Option<String>,
}

impl StrategyConfig {
    pub fn new(strategy_id: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            instrument: instrument.into(),
            interval: None,
            params: ParamSet::new(),
            risk: RiskConfig::default(),
        }
    }

    pub fn with_params(mut self, params: ParamSet) -> Self {
        self.params = params;
        self
    }

    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    /// BLAKE3 over canonical JSON of the parameters, risk config and interval.
    ///
    /// `ParamSet` is a `BTreeMap`, so key order is fixed.
    pub fn params_hash(&self) -> ConfigHash {
        let hashed = HashedParams {
            params: &self.params,
            risk: &self.risk,
            interval: &self.interval,
        };
        // Serializing maps of strings and numbers cannot fail; fall back to Debug
        // output rather than panic so identity stays total.
        let json = serde_json::to_string(&hashed).unwrap_or_else(|_| format!("{hashed:?}"));
        ConfigHash::from_bytes(json.as_bytes())
    }

    /// Full content hash including strategy id and instrument.
    pub fn content_hash(&self) -> ConfigHash {
        let json = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        ConfigHash::from_bytes(json.as_bytes())
    }

    pub fn identity(&self) -> StrategyIdentity {
        StrategyIdentity {
            strategy_id: self.strategy_id.clone(),
            instrument: self.instrument.clone(),
            params_hash: self.params_hash(),
        }
    }
}

impl fmt::Debug for HashedParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}|{:?}|{:?}", self.params, self.risk, self.interval)
    }
}

/// TOML document holding a list of strategy configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyList {
    #[serde(default, rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

/// Parse `[[strategy]]` tables from TOML text.
pub fn parse_strategy_list(text: &str) -> Result<Vec<StrategyConfig>, ConfigError> {
    let list: StrategyList = toml::from_str(text)?;
    Ok(list.strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    fn sample() -> StrategyConfig {
        let mut params = ParamSet::new();
        params.insert("sma_period".into(), ParamValue::Int(20));
        StrategyConfig::new("sma_cross", "BTCUSDT").with_params(params)
    }

    #[test]
    fn identity_is_stable() {
        assert_eq!(sample().identity(), sample().identity());
        assert_eq!(sample().content_hash(), sample().content_hash());
    }

    #[test]
    fn params_change_identity() {
        let mut other = sample();
        other.params.insert("sma_period".into(), ParamValue::Int(21));
        assert_ne!(sample().identity(), other.identity());
        assert_eq!(sample().identity().strategy_id, other.identity().strategy_id);
    }

    #[test]
    fn risk_change_changes_identity() {
        let other = sample().with_risk(RiskConfig::atr());
        assert_ne!(sample().identity(), other.identity());
    }

    #[test]
    fn parse_list_from_toml() {
        let text = r#"
            [[strategy]]
            strategy_id = "sma_cross"
            instrument = "BTCUSDT"
            params = { sma_period = 30 }

            [[strategy]]
            strategy_id = "mean_reversion"
            instrument = "ETHUSDT"
            interval = "1hour"
            risk = { type = "ATR", sl_multiplier = 1.5 }
        "#;
        let configs = parse_strategy_list(text).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].params["sma_period"], ParamValue::Int(30));
        assert_eq!(configs[0].risk, RiskConfig::default());
        assert_eq!(configs[1].risk.kind(), "ATR");
    }

    #[test]
    fn parse_error_is_config_error() {
        assert!(matches!(
            parse_strategy_list("[[strategy]]\nstrategy_id = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn identity_display_is_short() {
        let shown = sample().identity().to_string();
        assert!(shown.starts_with("sma_cross@BTCUSDT#"));
        assert_eq!(shown.len(), "sma_cross@BTCUSDT#".len() + 12);
    }
}
