//! Z-score mean reversion.
//!
//! - Long when z climbs back above the lower threshold.
//! - Short when z falls back below the upper threshold.
//! - Crossing zero upward emits Short (closes a long); downward emits Long
//!   (closes a short).
//!
//! Checks run in that order; the first match wins.

use super::{CandleContext, Strategy};
use crate::config::ConfigError;
use crate::domain::{Signal, SignalDirection};
use crate::indicators::{Indicator, Sma, ZScore};
use crate::params::{ParamSet, ParamSetExt, ParamSpec};

pub const ID: &str = "mean_reversion";

#[derive(Debug, Clone)]
pub struct MeanReversion {
    sma_period: usize,
    upper: f64,
    lower: f64,
    z_key: String,
}

impl MeanReversion {
    pub fn new(sma_period: usize, upper: f64, lower: f64) -> Result<Self, ConfigError> {
        if lower >= upper {
            return Err(ConfigError::InvalidParam {
                name: "z_score_lower_threshold".into(),
                reason: format!("{lower} must be below the upper threshold {upper}"),
            });
        }
        let z = ZScore::new(sma_period);
        Ok(Self {
            sma_period,
            upper,
            lower,
            z_key: z.name().to_string(),
        })
    }

    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("sma_period", 20, 10, 50, "Window for the mean and standard deviation"),
            ParamSpec::float("z_score_upper_threshold", 2.0, 1.5, 3.0, 0.1, "Short entry threshold"),
            ParamSpec::float("z_score_lower_threshold", -2.0, -3.0, -1.5, 0.1, "Long entry threshold"),
            ParamSpec::text("candle_interval", "15min", "Recommended candle interval"),
        ]
    }

    pub fn build(params: &ParamSet) -> Result<Box<dyn Strategy>, ConfigError> {
        let strategy = Self::new(
            params.get_usize("sma_period")?,
            params.get_f64("z_score_upper_threshold")?,
            params.get_f64("z_score_lower_threshold")?,
        )?;
        Ok(Box::new(strategy))
    }
}

impl Strategy for MeanReversion {
    fn id(&self) -> &str {
        ID
    }

    fn min_history(&self) -> usize {
        self.sma_period + 1
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Sma::new(self.sma_period)), Box::new(ZScore::new(self.sma_period))]
    }

    fn on_candle(&self, ctx: &CandleContext<'_>) -> Option<Signal> {
        let prev = ctx.previous()?.indicator(&self.z_key)?;
        let cur = ctx.current().indicator(&self.z_key)?;

        let direction = if prev < self.lower && cur >= self.lower {
            SignalDirection::Long
        } else if prev > self.upper && cur <= self.upper {
            SignalDirection::Short
        } else if prev < 0.0 && cur >= 0.0 {
            SignalDirection::Short
        } else if prev > 0.0 && cur <= 0.0 {
            SignalDirection::Long
        } else {
            return None;
        };
        Some(ctx.signal(direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::bars_from_closes;

    fn with_z(values: &[f64]) -> Vec<crate::domain::Bar> {
        let mut bars = bars_from_closes(&vec![100.0; values.len()], 100.0);
        for (bar, z) in bars.iter_mut().zip(values) {
            bar.set_indicator("zscore_20", *z);
        }
        bars
    }

    fn direction_at_end(z: &[f64]) -> Option<SignalDirection> {
        let strategy = MeanReversion::new(20, 2.0, -2.0).unwrap();
        let bars = with_z(z);
        let ctx = CandleContext::new(ID, None, &bars).unwrap();
        strategy.on_candle(&ctx).map(|s| s.direction)
    }

    #[test]
    fn threshold_reentries() {
        assert_eq!(direction_at_end(&[-2.5, -1.9]), Some(SignalDirection::Long));
        assert_eq!(direction_at_end(&[2.5, 1.9]), Some(SignalDirection::Short));
    }

    #[test]
    fn zero_crossings_close() {
        assert_eq!(direction_at_end(&[-0.5, 0.1]), Some(SignalDirection::Short));
        assert_eq!(direction_at_end(&[0.5, -0.1]), Some(SignalDirection::Long));
    }

    #[test]
    fn quiet_band_is_silent() {
        assert_eq!(direction_at_end(&[0.5, 1.0]), None);
        assert_eq!(direction_at_end(&[-2.5, -2.4]), None);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        assert!(MeanReversion::new(20, -1.0, 1.0).is_err());
    }
}
