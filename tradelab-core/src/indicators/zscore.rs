//! Rolling z-score of close against its own SMA.
//!
//! z[t] = (close[t] - mean) / stddev over the trailing `period` closes, using
//! the sample standard deviation. A flat window yields 0.

use super::sma::rolling_mean;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct ZScore {
    period: usize,
    name: String,
}

impl ZScore {
    pub fn new(period: usize) -> Self {
        let period = period.max(2);
        Self {
            period,
            name: format!("zscore_{period}"),
        }
    }
}

impl Indicator for ZScore {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let means = rolling_mean(&closes, self.period);
        let p = self.period;
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let mean = means[i];
                if mean.is_nan() {
                    return f64::NAN;
                }
                let window = &closes[i + 1 - p..=i];
                let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (p - 1) as f64;
                let std = var.sqrt();
                if std < 1e-12 {
                    0.0
                } else {
                    (close - mean) / std
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn flat_window_is_zero() {
        let result = ZScore::new(3).compute(&make_bars(&[5.0, 5.0, 5.0, 5.0]));
        assert!(result[1].is_nan());
        assert_eq!(result[2], 0.0);
    }

    #[test]
    fn known_value() {
        // window [1,2,3]: mean 2, sample std 1 → z = 1
        let result = ZScore::new(3).compute(&make_bars(&[1.0, 2.0, 3.0]));
        assert_approx(result[2], 1.0, DEFAULT_EPSILON);
    }
}
