//! Price / SMA crossover.
//!
//! Long when the close crosses above its SMA, Short when it crosses below.

use super::{crossed_above, crossed_below, CandleContext, Strategy};
use crate::config::ConfigError;
use crate::domain::{Signal, SignalDirection};
use crate::indicators::{Indicator, Sma};
use crate::params::{ParamSet, ParamSetExt, ParamSpec};

pub const ID: &str = "sma_cross";

#[derive(Debug, Clone)]
pub struct SmaCross {
    sma_period: usize,
    sma_key: String,
}

impl SmaCross {
    pub fn new(sma_period: usize) -> Self {
        let sma = Sma::new(sma_period);
        Self {
            sma_period,
            sma_key: sma.name().to_string(),
        }
    }

    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("sma_period", 50, 10, 100, "Moving average period"),
            ParamSpec::text("candle_interval", "1hour", "Recommended candle interval"),
        ]
    }

    pub fn build(params: &ParamSet) -> Result<Box<dyn Strategy>, ConfigError> {
        Ok(Box::new(Self::new(params.get_usize("sma_period")?)))
    }
}

impl Strategy for SmaCross {
    fn id(&self) -> &str {
        ID
    }

    fn min_history(&self) -> usize {
        self.sma_period + 1
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Sma::new(self.sma_period))]
    }

    fn on_candle(&self, ctx: &CandleContext<'_>) -> Option<Signal> {
        let (prev, cur) = (ctx.previous()?, ctx.current());
        let prev_sma = prev.indicator(&self.sma_key)?;
        let cur_sma = cur.indicator(&self.sma_key)?;

        if crossed_above(prev.close, cur.close, prev_sma, cur_sma) {
            Some(ctx.signal(SignalDirection::Long))
        } else if crossed_below(prev.close, cur.close, prev_sma, cur_sma) {
            Some(ctx.signal(SignalDirection::Short))
        } else {
            None
        }
    }
}
