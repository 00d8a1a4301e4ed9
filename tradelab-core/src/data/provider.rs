//! Data provider trait and structured error types.
//!
//! `DataProvider` is the sequential view the engine and live feeds share:
//! a warm-up batch, then one bar at a time until end of data. `FileProvider`
//! is the backtest implementation over an in-memory, shared bar slice.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Bar, BarError};

/// Missing, corrupt, or out-of-order market data. Fatal to the run that hits it.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for '{instrument}' at {}", path.display())]
    NotFound { instrument: String, path: PathBuf },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row {row} for '{instrument}': {reason}")]
    Malformed {
        instrument: String,
        row: usize,
        reason: String,
    },

    #[error("non-monotonic timestamps for '{instrument}' at bar {index}: {prev} then {next}")]
    NonMonotonic {
        instrument: String,
        index: usize,
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("invalid bar {index} for '{instrument}'")]
    InvalidBar {
        instrument: String,
        index: usize,
        #[source]
        source: BarError,
    },

    #[error("'{instrument}' has {available} bars, {requested} requested")]
    InsufficientHistory {
        instrument: String,
        requested: usize,
        available: usize,
    },

    #[error("instrument mismatch: provider serves '{served}', asked for '{requested}'")]
    WrongInstrument { served: String, requested: String },
}

/// Sequential market data source.
pub trait DataProvider {
    /// Up to `bars` bars of history preceding the stream, oldest first.
    /// Bars returned here are not returned again by `next`.
    fn warm_up(&mut self, instrument: &str, bars: usize) -> Result<Vec<Bar>, DataError>;

    /// Next bar, or `None` at end of data.
    fn next(&mut self) -> Result<Option<Bar>, DataError>;
}

/// Check every bar and that timestamps strictly increase.
pub fn validate_sequence(instrument: &str, bars: &[Bar]) -> Result<(), DataError> {
    for (index, bar) in bars.iter().enumerate() {
        check_bar(instrument, index, bar, index.checked_sub(1).map(|i| &bars[i]))?;
    }
    Ok(())
}

fn check_bar(instrument: &str, index: usize, bar: &Bar, prev: Option<&Bar>) -> Result<(), DataError> {
    bar.validate().map_err(|source| DataError::InvalidBar {
        instrument: instrument.to_string(),
        index,
        source,
    })?;
    if let Some(prev) = prev {
        if bar.timestamp <= prev.timestamp {
            return Err(DataError::NonMonotonic {
                instrument: instrument.to_string(),
                index,
                prev: prev.timestamp,
                next: bar.timestamp,
            });
        }
    }
    Ok(())
}

/// File-backed sequential provider: a cursor over a shared, read-only slice.
///
/// Each bar is validated as the cursor reaches it, so a corrupt row surfaces
/// exactly when the run would have consumed it.
#[derive(Debug, Clone)]
pub struct FileProvider {
    instrument: String,
    bars: Arc<[Bar]>,
    cursor: usize,
}

impl FileProvider {
    pub fn new(instrument: impl Into<String>, bars: Arc<[Bar]>) -> Self {
        Self {
            instrument: instrument.into(),
            bars,
            cursor: 0,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn remaining(&self) -> usize {
        self.bars.len() - self.cursor
    }

    /// Drain the remainder into a vector, validating as it goes.
    pub fn collect_remaining(&mut self) -> Result<Vec<Bar>, DataError> {
        let mut out = Vec::with_capacity(self.remaining());
        while let Some(bar) = self.next()? {
            out.push(bar);
        }
        Ok(out)
    }

    fn advance(&mut self) -> Result<Option<Bar>, DataError> {
        let Some(bar) = self.bars.get(self.cursor) else {
            return Ok(None);
        };
        let prev = self.cursor.checked_sub(1).map(|i| &self.bars[i]);
        check_bar(&self.instrument, self.cursor, bar, prev)?;
        self.cursor += 1;
        Ok(Some(bar.clone()))
    }
}

impl DataProvider for FileProvider {
    fn warm_up(&mut self, instrument: &str, bars: usize) -> Result<Vec<Bar>, DataError> {
        if instrument != self.instrument {
            return Err(DataError::WrongInstrument {
                served: self.instrument.clone(),
                requested: instrument.to_string(),
            });
        }
        let mut out = Vec::with_capacity(bars.min(self.remaining()));
        while out.len() < bars {
            match self.advance()? {
                Some(bar) => out.push(bar),
                None => break,
            }
        }
        Ok(out)
    }

    fn next(&mut self) -> Result<Option<Bar>, DataError> {
        self.advance()
    }
}
