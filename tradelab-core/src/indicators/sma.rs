//! Simple Moving Average (SMA).
//!
//! Rolling mean of a bar field over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

use super::{Indicator, PriceSource};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    source: PriceSource,
    name: String,
}

impl Sma {
    /// SMA of closes, named `sma_<period>`.
    pub fn new(period: usize) -> Self {
        Self::of(period, PriceSource::Close)
    }

    /// SMA of an arbitrary field; volume SMAs are named `sma_<period>_volume`.
    pub fn of(period: usize, source: PriceSource) -> Self {
        let period = period.max(1);
        Self {
            period,
            source,
            name: format!("sma_{period}{}", source.suffix()),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let values: Vec<f64> = bars.iter().map(|b| self.source.read(b)).collect();
        rolling_mean(&values, self.period)
    }
}

/// Rolling mean; a NaN anywhere in the window makes that output NaN.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }
    result
}
