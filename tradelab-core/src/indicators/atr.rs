//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period), seeded with the mean of
//! TR[1..=period]. Lookback: period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }

    /// Column name an ATR of this period writes, for readers of the bar map.
    pub fn column(period: usize) -> String {
        format!("atr_{}", period.max(1))
    }
}

/// True Range series. TR[0] is NaN: there is no previous close.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for i in 1..bars.len() {
        let (h, l, pc) = (bars[i].high, bars[i].low, bars[i - 1].close);
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let tr = true_range(bars);
        let n = tr.len();
        let mut result = vec![f64::NAN; n];
        let p = self.period;
        if n < p + 1 {
            return result;
        }

        let seed = &tr[1..=p];
        if seed.iter().any(|v| v.is_nan()) {
            return result;
        }
        let mut prev = seed.iter().sum::<f64>() / p as f64;
        result[p] = prev;
        let alpha = 1.0 / p as f64;
        for i in (p + 1)..n {
            if tr[i].is_nan() {
                break;
            }
            prev = alpha * tr[i] + (1.0 - alpha) * prev;
            result[i] = prev;
        }
        result
    }
}
