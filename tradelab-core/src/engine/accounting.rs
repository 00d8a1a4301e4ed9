//! Equity curve recording.
//!
//! Equity is cash plus unrealized PnL marked at the bar close, recorded once
//! per bar after the event queue has drained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone)]
pub struct EquityTracker {
    initial: f64,
    points: Vec<EquityPoint>,
    peak: f64,
    max_drawdown: f64,
}

impl EquityTracker {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            points: Vec::new(),
            peak: initial,
            max_drawdown: 0.0,
        }
    }

    pub fn with_capacity(initial: f64, bars: usize) -> Self {
        let mut tracker = Self::new(initial);
        tracker.points.reserve(bars);
        tracker
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, equity: f64) {
        if equity > self.peak {
            self.peak = equity;
        }
        if self.peak > 0.0 {
            self.max_drawdown = self.max_drawdown.max((self.peak - equity) / self.peak);
        }
        self.points.push(EquityPoint { timestamp, equity });
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn last(&self) -> f64 {
        self.points.last().map(|p| p.equity).unwrap_or(self.initial)
    }

    /// Largest peak-to-trough decline seen so far, as a fraction of the peak.
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<EquityPoint> {
        self.points
    }
}

/// Peak-to-trough drawdown of a series, as a fraction of the running peak.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tracks_drawdown_from_initial_peak() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = EquityTracker::new(100.0);
        tracker.record(t0, 90.0);
        tracker.record(t0, 120.0);
        tracker.record(t0, 96.0);
        assert!((tracker.max_drawdown() - 0.2).abs() < 1e-12);
        assert_eq!(tracker.last(), 96.0);
        assert_eq!(tracker.points().len(), 3);
    }

    #[test]
    fn empty_tracker_reports_initial() {
        let tracker = EquityTracker::new(50.0);
        assert_eq!(tracker.last(), 50.0);
        assert_eq!(tracker.max_drawdown(), 0.0);
    }

    #[test]
    fn series_drawdown() {
        assert!((max_drawdown(&[100.0, 150.0, 75.0, 200.0]) - 0.5).abs() < 1e-12);
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
    }
}
