//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// OHLCV bar for one instrument at one point in time, plus the indicator
/// values a strategy attached to it in `process_data`.
///
/// Indicators live in a `BTreeMap` so that serialized bars (and anything
/// hashed from them) have a deterministic key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indicators: BTreeMap<String, f64>,
}

/// Why a bar failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("field '{field}' is missing or not finite")]
    MissingField { field: &'static str },
    #[error("inconsistent range: high {high} < low {low}")]
    InvertedRange { high: f64, low: f64 },
    #[error("non-positive price: {0}")]
    NonPositivePrice(f64),
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
            indicators: BTreeMap::new(),
        }
    }

    /// Check that every required field is present and the OHLC range is coherent.
    pub fn validate(&self) -> Result<(), BarError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(BarError::MissingField { field });
            }
        }
        if self.high < self.low {
            return Err(BarError::InvertedRange {
                high: self.high,
                low: self.low,
            });
        }
        if self.close <= 0.0 {
            return Err(BarError::NonPositivePrice(self.close));
        }
        Ok(())
    }

    /// Indicator value by name. `None` if absent or still warming up (NaN).
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn set_indicator(&mut self, name: impl Into<String>, value: f64) {
        self.indicators.insert(name.into(), value);
    }

    /// Relative bar range, used as a volatility proxy by the slippage model.
    pub fn range_fraction(&self) -> f64 {
        if self.close <= 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.close
    }
}
