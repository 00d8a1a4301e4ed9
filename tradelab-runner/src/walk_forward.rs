//! Walk-forward windows: fixed-width train slice, fixed-width test slice,
//! sliding by the test width so test slices tile the timeline.
//!
//! Window `k`:
//! - train = `[k*step, k*step + train_len)`
//! - test  = `[train_end, train_end + test_len)`
//!
//! Windows are emitted while `test_end <= total`; a trailing partial test
//! period is dropped.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::warn;

use tradelab_core::config::ConfigError;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub train_len: usize,
    pub test_len: usize,
    /// Must equal `test_len`.
    pub step: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            train_len: 600,
            test_len: 200,
            step: 200,
        }
    }
}

impl WindowConfig {
    pub fn new(train_len: usize, test_len: usize, step: usize) -> Self {
        Self {
            train_len,
            test_len,
            step,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.train_len == 0 || self.test_len == 0 || self.step == 0 {
            return Err(ConfigError::Invalid(format!(
                "window lengths must be positive (train={}, test={}, step={})",
                self.train_len, self.test_len, self.step
            )));
        }
        if self.step != self.test_len {
            return Err(ConfigError::Invalid(format!(
                "step ({}) must equal test_len ({}) so test windows tile",
                self.step, self.test_len
            )));
        }
        Ok(())
    }

    /// Bars needed for at least one window.
    pub fn min_bars(&self) -> usize {
        self.train_len + self.test_len
    }
}

// ─── Windows ─────────────────────────────────────────────────────────

/// One (train, test) pair of bar index ranges on the common timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

impl Window {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}

/// Windows over `total` bars, in chronological order.
///
/// Returns an empty list (with a warning) when the history is too short.
pub fn create_windows(total: usize, config: &WindowConfig) -> Result<Vec<Window>, ConfigError> {
    config.validate()?;
    let mut windows = Vec::new();
    let mut k = 0;
    loop {
        let train_start = k * config.step;
        let train_end = train_start + config.train_len;
        let test_end = train_end + config.test_len;
        if test_end > total {
            break;
        }
        windows.push(Window {
            index: k,
            train: train_start..train_end,
            test: train_end..test_end,
        });
        k += 1;
    }
    if windows.is_empty() {
        warn!(
            total,
            needed = config.min_bars(),
            "history too short for a single walk-forward window"
        );
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousand_bars_give_two_windows() {
        let windows = create_windows(1000, &WindowConfig::new(600, 200, 200)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].train, 0..600);
        assert_eq!(windows[0].test, 600..800);
        assert_eq!(windows[1].train, 200..800);
        assert_eq!(windows[1].test, 800..1000);
    }

    #[test]
    fn trailing_partial_window_dropped() {
        let windows = create_windows(1150, &WindowConfig::new(600, 200, 200)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows.last().unwrap().test.end, 1000);
    }

    #[test]
    fn short_history_is_empty_not_error() {
        assert!(create_windows(799, &WindowConfig::new(600, 200, 200)).unwrap().is_empty());
    }

    #[test]
    fn non_tiling_step_rejected() {
        assert!(matches!(
            create_windows(1000, &WindowConfig::new(600, 200, 100)),
            Err(ConfigError::Invalid(_))
        ));
        assert!(create_windows(1000, &WindowConfig::new(0, 200, 200)).is_err());
    }
}
