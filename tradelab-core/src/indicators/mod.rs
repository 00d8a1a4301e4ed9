//! Concrete indicator implementations.
//!
//! Indicators are pure functions: bar history in, numeric series out. A
//! strategy's `process_data` runs its indicators over the whole history once
//! and writes the values into each bar's indicator map under `name()`.
//!
//! # Look-ahead contamination guard
//! No indicator value at bar t may depend on price data from bar t+1 or later.

pub mod atr;
pub mod ema;
pub mod sma;
pub mod zscore;

pub use atr::Atr;
pub use ema::Ema;
pub use sma::Sma;
pub use zscore::ZScore;

use crate::domain::Bar;

/// Which bar field an indicator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Close,
    Volume,
}

impl PriceSource {
    pub fn read(self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Close => bar.close,
            PriceSource::Volume => bar.volume,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            PriceSource::Close => "",
            PriceSource::Volume => "_volume",
        }
    }
}

/// Trait for indicators.
///
/// Indicators take a full bar series and produce an output series of the same
/// length. The first `lookback()` values are `f64::NAN` (warmup).
pub trait Indicator: Send + Sync {
    /// Column name written into `Bar::indicators` (e.g. "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Compute every indicator and attach the values to a copy of `bars`.
pub fn enrich(bars: &[Bar], indicators: &[Box<dyn Indicator>]) -> Vec<Bar> {
    let mut out = bars.to_vec();
    for indicator in indicators {
        let series = indicator.compute(bars);
        for (bar, value) in out.iter_mut().zip(series) {
            bar.set_indicator(indicator.name(), value);
        }
    }
    out
}

/// Largest lookback among a set of indicators.
pub fn max_lookback(indicators: &[Box<dyn Indicator>]) -> usize {
    indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                "TEST",
                base + chrono::Duration::days(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
