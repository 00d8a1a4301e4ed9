//! Triple filter: trend EMA, fast/slow EMA impulse, and a volume filter.
//!
//! Long needs all three: close above the trend EMA, the fast EMA crossing
//! above the slow EMA, and volume above its SMA. Short is the mirror image.

use super::{crossed_above, crossed_below, CandleContext, Strategy};
use crate::config::ConfigError;
use crate::domain::{Signal, SignalDirection};
use crate::indicators::{Ema, Indicator, PriceSource, Sma};
use crate::params::{ParamSet, ParamSetExt, ParamSpec};

pub const ID: &str = "triple_filter";

#[derive(Debug, Clone)]
pub struct TripleFilter {
    fast: usize,
    slow: usize,
    trend: usize,
    volume_sma: usize,
    keys: Keys,
}

#[derive(Debug, Clone)]
struct Keys {
    fast: String,
    slow: String,
    trend: String,
    volume: String,
}

impl TripleFilter {
    pub fn new(fast: usize, slow: usize, trend: usize, volume_sma: usize) -> Result<Self, ConfigError> {
        if fast >= slow {
            return Err(ConfigError::InvalidParam {
                name: "ema_fast_period".into(),
                reason: format!("{fast} must be below ema_slow_period {slow}"),
            });
        }
        let keys = Keys {
            fast: Ema::new(fast).name().to_string(),
            slow: Ema::new(slow).name().to_string(),
            trend: Ema::new(trend).name().to_string(),
            volume: Sma::of(volume_sma, PriceSource::Volume).name().to_string(),
        };
        Ok(Self {
            fast,
            slow,
            trend,
            volume_sma,
            keys,
        })
    }

    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("ema_fast_period", 9, 5, 20, "Fast EMA (impulse)"),
            ParamSpec::int("ema_slow_period", 21, 21, 50, "Slow EMA (impulse)"),
            ParamSpec::int("ema_trend_period", 200, 100, 300, "Trend EMA").fixed(),
            ParamSpec::int("volume_sma_period", 20, 10, 50, "Volume SMA for the volume filter").fixed(),
            ParamSpec::text("candle_interval", "5min", "Recommended candle interval"),
        ]
    }

    pub fn build(params: &ParamSet) -> Result<Box<dyn Strategy>, ConfigError> {
        let strategy = Self::new(
            params.get_usize("ema_fast_period")?,
            params.get_usize("ema_slow_period")?,
            params.get_usize("ema_trend_period")?,
            params.get_usize("volume_sma_period")?,
        )?;
        Ok(Box::new(strategy))
    }
}

impl Strategy for TripleFilter {
    fn id(&self) -> &str {
        ID
    }

    fn min_history(&self) -> usize {
        self.trend + 1
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(Ema::new(self.fast)),
            Box::new(Ema::new(self.slow)),
            Box::new(Ema::new(self.trend)),
            Box::new(Sma::of(self.volume_sma, PriceSource::Volume)),
        ]
    }

    fn on_candle(&self, ctx: &CandleContext<'_>) -> Option<Signal> {
        let (prev, cur) = (ctx.previous()?, ctx.current());
        let trend = cur.indicator(&self.keys.trend)?;
        let volume_avg = cur.indicator(&self.keys.volume)?;
        let (prev_fast, prev_slow) = (prev.indicator(&self.keys.fast)?, prev.indicator(&self.keys.slow)?);
        let (cur_fast, cur_slow) = (cur.indicator(&self.keys.fast)?, cur.indicator(&self.keys.slow)?);

        if cur.volume <= volume_avg {
            return None;
        }
        if cur.close > trend && crossed_above(prev_fast, cur_fast, prev_slow, cur_slow) {
            return Some(ctx.signal(SignalDirection::Long));
        }
        if cur.close < trend && crossed_below(prev_fast, cur_fast, prev_slow, cur_slow) {
            return Some(ctx.signal(SignalDirection::Short));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::strategy::test_support::bars_from_closes;

    fn bars(close: f64, volume: f64, prev: (f64, f64), cur: (f64, f64), trend: f64) -> Vec<Bar> {
        let mut bars = bars_from_closes(&[close, close], 100.0);
        bars[1].volume = volume;
        for (bar, (fast, slow)) in bars.iter_mut().zip([prev, cur]) {
            bar.set_indicator("ema_9", fast);
            bar.set_indicator("ema_21", slow);
            bar.set_indicator("ema_200", trend);
            bar.set_indicator("sma_20_volume", 100.0);
        }
        bars
    }

    fn eval(bars: &[Bar]) -> Option<SignalDirection> {
        let strategy = TripleFilter::new(9, 21, 200, 20).unwrap();
        let ctx = CandleContext::new(ID, None, bars).unwrap();
        strategy.on_candle(&ctx).map(|s| s.direction)
    }

    #[test]
    fn all_three_filters_long() {
        let b = bars(110.0, 150.0, (99.0, 100.0), (101.0, 100.0), 105.0);
        assert_eq!(eval(&b), Some(SignalDirection::Long));
    }

    #[test]
    fn all_three_filters_short() {
        let b = bars(90.0, 150.0, (101.0, 100.0), (99.0, 100.0), 95.0);
        assert_eq!(eval(&b), Some(SignalDirection::Short));
    }

    #[test]
    fn low_volume_blocks() {
        let b = bars(110.0, 80.0, (99.0, 100.0), (101.0, 100.0), 105.0);
        assert_eq!(eval(&b), None);
    }

    #[test]
    fn against_trend_blocks() {
        let b = bars(100.0, 150.0, (99.0, 100.0), (101.0, 100.0), 105.0);
        assert_eq!(eval(&b), None);
    }

    #[test]
    fn min_history_follows_trend_period() {
        let s = TripleFilter::new(9, 21, 200, 20).unwrap();
        assert_eq!(s.min_history(), 201);
        assert!(TripleFilter::new(21, 21, 200, 20).is_err());
    }
}
