//! Risk management: protective levels at entry and position sizing.
//!
//! - `RiskConfig` picks a manager and carries its parameters. Parameters take
//!   part in optimization under the `rm_` prefix.
//! - `RiskConfig::levels()` turns an entry price into stop-loss/take-profit.
//! - `sizer::size_entry()` turns those levels into a quantity.

pub mod sizer;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::domain::{Bar, PositionSide};
use crate::indicators::{Atr, Indicator};
use crate::params::{ParamSet, ParamSetExt, ParamSpec};

pub use sizer::{size_entry, SizingDecision, SizingLimit};

/// Prefix that marks a risk parameter inside a flat search assignment.
pub const RISK_PARAM_PREFIX: &str = "rm_";

/// Risk manager selection and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskConfig {
    /// Stop at a fixed percentage from entry; target at `tp_ratio` times the stop distance.
    Fixed {
        #[serde(default = "default_risk_percent")]
        risk_percent_long: f64,
        #[serde(default = "default_risk_percent")]
        risk_percent_short: f64,
        #[serde(default = "default_tp_ratio")]
        tp_ratio: f64,
    },
    /// Stop and target at multiples of ATR from entry.
    Atr {
        #[serde(default = "default_atr_period")]
        atr_period: usize,
        #[serde(default = "default_sl_multiplier")]
        sl_multiplier: f64,
        #[serde(default = "default_tp_multiplier")]
        tp_multiplier: f64,
        /// Percent of capital risked per trade, used by the sizer.
        #[serde(default = "default_risk_percent")]
        risk_percent: f64,
    },
}

fn default_risk_percent() -> f64 {
    2.0
}
fn default_tp_ratio() -> f64 {
    2.0
}
fn default_atr_period() -> usize {
    14
}
fn default_sl_multiplier() -> f64 {
    2.0
}
fn default_tp_multiplier() -> f64 {
    4.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig::Fixed {
            risk_percent_long: default_risk_percent(),
            risk_percent_short: default_risk_percent(),
            tp_ratio: default_tp_ratio(),
        }
    }
}

/// Stop-loss and take-profit for a prospective entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Percent of capital the sizer may lose if the stop is hit.
    pub risk_percent: f64,
}

impl RiskConfig {
    /// Default `Atr` variant.
    pub fn atr() -> Self {
        RiskConfig::Atr {
            atr_period: default_atr_period(),
            sl_multiplier: default_sl_multiplier(),
            tp_multiplier: default_tp_multiplier(),
            risk_percent: default_risk_percent(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RiskConfig::Fixed { .. } => "FIXED",
            RiskConfig::Atr { .. } => "ATR",
        }
    }

    /// Indicators this manager reads from the bar at entry time.
    pub fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        match self {
            RiskConfig::Fixed { .. } => Vec::new(),
            RiskConfig::Atr { atr_period, .. } => vec![Box::new(Atr::new(*atr_period))],
        }
    }

    /// Bars of history the manager needs before it can price an entry.
    pub fn min_history(&self) -> usize {
        match self {
            RiskConfig::Fixed { .. } => 0,
            RiskConfig::Atr { atr_period, .. } => atr_period + 1,
        }
    }

    /// Declared parameters, unprefixed.
    pub fn param_specs(&self) -> Vec<ParamSpec> {
        match self {
            RiskConfig::Fixed { .. } => vec![
                ParamSpec::float("risk_percent_long", 2.0, 0.5, 5.0, 0.5, "Stop distance for longs, % of entry"),
                ParamSpec::float("risk_percent_short", 2.0, 0.5, 5.0, 0.5, "Stop distance for shorts, % of entry"),
                ParamSpec::float("tp_ratio", 2.0, 1.0, 5.0, 0.5, "Take-profit distance as a multiple of the stop"),
            ],
            RiskConfig::Atr { .. } => vec![
                ParamSpec::int("atr_period", 14, 5, 30, "ATR lookback").fixed(),
                ParamSpec::float("sl_multiplier", 2.0, 1.0, 4.0, 0.25, "Stop distance in ATRs"),
                ParamSpec::float("tp_multiplier", 4.0, 1.0, 8.0, 0.5, "Target distance in ATRs"),
                ParamSpec::float("risk_percent", 2.0, 0.5, 5.0, 0.5, "Capital risked per trade, %"),
            ],
        }
    }

    /// Rebuild with any `rm_`-prefixed entries of `params` applied.
    pub fn with_overrides(&self, params: &ParamSet) -> Result<Self, ConfigError> {
        let scoped: ParamSet = params
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(RISK_PARAM_PREFIX)
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect();
        if scoped.is_empty() {
            return Ok(self.clone());
        }
        let merged = crate::params::merge_with_defaults(&self.current_params(), &scoped)?;
        let updated = match self {
            RiskConfig::Fixed { .. } => RiskConfig::Fixed {
                risk_percent_long: merged.get_f64("risk_percent_long")?,
                risk_percent_short: merged.get_f64("risk_percent_short")?,
                tp_ratio: merged.get_f64("tp_ratio")?,
            },
            RiskConfig::Atr { .. } => RiskConfig::Atr {
                atr_period: merged.get_usize("atr_period")?,
                sl_multiplier: merged.get_f64("sl_multiplier")?,
                tp_multiplier: merged.get_f64("tp_multiplier")?,
                risk_percent: merged.get_f64("risk_percent")?,
            },
        };
        updated.validate()?;
        Ok(updated)
    }

    /// Specs whose defaults are this config's current values.
    fn current_params(&self) -> Vec<ParamSpec> {
        use crate::params::ParamValue;
        let current: Vec<(&str, ParamValue)> = match *self {
            RiskConfig::Fixed {
                risk_percent_long,
                risk_percent_short,
                tp_ratio,
            } => vec![
                ("risk_percent_long", ParamValue::Float(risk_percent_long)),
                ("risk_percent_short", ParamValue::Float(risk_percent_short)),
                ("tp_ratio", ParamValue::Float(tp_ratio)),
            ],
            RiskConfig::Atr {
                atr_period,
                sl_multiplier,
                tp_multiplier,
                risk_percent,
            } => vec![
                ("atr_period", ParamValue::Int(atr_period as i64)),
                ("sl_multiplier", ParamValue::Float(sl_multiplier)),
                ("tp_multiplier", ParamValue::Float(tp_multiplier)),
                ("risk_percent", ParamValue::Float(risk_percent)),
            ],
        };
        let mut specs = self.param_specs();
        for spec in &mut specs {
            if let Some((_, v)) = current.iter().find(|(n, _)| *n == spec.name) {
                spec.default = v.clone();
            }
        }
        specs
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidParam {
                    name: format!("{RISK_PARAM_PREFIX}{name}"),
                    reason: format!("must be positive, got {v}"),
                })
            }
        };
        match *self {
            RiskConfig::Fixed {
                risk_percent_long,
                risk_percent_short,
                tp_ratio,
            } => {
                positive("risk_percent_long", risk_percent_long)?;
                positive("risk_percent_short", risk_percent_short)?;
                positive("tp_ratio", tp_ratio)
            }
            RiskConfig::Atr {
                atr_period,
                sl_multiplier,
                tp_multiplier,
                risk_percent,
            } => {
                positive("atr_period", atr_period as f64)?;
                positive("sl_multiplier", sl_multiplier)?;
                positive("tp_multiplier", tp_multiplier)?;
                positive("risk_percent", risk_percent)
            }
        }
    }

    /// Protective levels for an entry at `entry` in direction `side`, priced off `bar`.
    ///
    /// Returns `None` when the manager cannot price the entry (ATR still warming up).
    pub fn levels(&self, entry: f64, side: PositionSide, bar: &Bar) -> Option<ProtectiveLevels> {
        let sign = side.sign();
        match *self {
            RiskConfig::Fixed {
                risk_percent_long,
                risk_percent_short,
                tp_ratio,
            } => {
                let pct = match side {
                    PositionSide::Long => risk_percent_long,
                    PositionSide::Short => risk_percent_short,
                } / 100.0;
                Some(ProtectiveLevels {
                    stop_loss: entry * (1.0 - sign * pct),
                    take_profit: entry * (1.0 + sign * pct * tp_ratio),
                    risk_percent: pct * 100.0,
                })
            }
            RiskConfig::Atr {
                atr_period,
                sl_multiplier,
                tp_multiplier,
                risk_percent,
            } => {
                let atr = bar.indicator(&Atr::column(atr_period)).filter(|v| *v > 0.0)?;
                Some(ProtectiveLevels {
                    stop_loss: entry - sign * atr * sl_multiplier,
                    take_profit: entry + sign * atr * tp_multiplier,
                    risk_percent,
                })
            }
        }
    }
}
