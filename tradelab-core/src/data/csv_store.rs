//! CSV bar store: one `<INSTRUMENT>.csv` per instrument under a root directory.
//!
//! Columns: `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339 or
//! plain `YYYY-MM-DD` (midnight UTC). Rows are validated on load; a blank
//! price cell is reported as a missing field.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::provider::{validate_sequence, DataError};
use crate::domain::Bar;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Serialize)]
struct CsvRowOut {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Read-only during a run; `write` exists for fixtures and data import.
#[derive(Debug, Clone)]
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.root.join(format!("{instrument}.csv"))
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.path_for(instrument).is_file()
    }

    /// Instruments with a file in the store, sorted.
    pub fn instruments(&self) -> Result<Vec<String>, DataError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| DataError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DataError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load and validate the full history of `instrument`.
    pub fn load(&self, instrument: &str) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(instrument);
        if !path.is_file() {
            return Err(DataError::NotFound {
                instrument: instrument.to_string(),
                path,
            });
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|source| DataError::Csv {
                path: path.clone(),
                source,
            })?;

        let mut bars = Vec::new();
        for (row, record) in reader.deserialize::<CsvRow>().enumerate() {
            let record = record.map_err(|source| DataError::Csv {
                path: path.clone(),
                source,
            })?;
            let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| DataError::Malformed {
                instrument: instrument.to_string(),
                row,
                reason: format!("unparseable timestamp '{}'", record.timestamp),
            })?;
            let field = |v: Option<f64>| v.unwrap_or(f64::NAN);
            bars.push(Bar::new(
                instrument,
                timestamp,
                field(record.open),
                field(record.high),
                field(record.low),
                field(record.close),
                field(record.volume),
            ));
        }
        validate_sequence(instrument, &bars)?;
        Ok(bars)
    }

    /// `len` bars starting at `start` (after validating the whole file).
    pub fn load_range(&self, instrument: &str, start: usize, len: usize) -> Result<Vec<Bar>, DataError> {
        let mut bars = self.load(instrument)?;
        let available = bars.len();
        if start + len > available {
            return Err(DataError::InsufficientHistory {
                instrument: instrument.to_string(),
                requested: start + len,
                available,
            });
        }
        bars.truncate(start + len);
        Ok(bars.split_off(start))
    }

    /// Number of bars on file, without validating prices.
    pub fn count(&self, instrument: &str) -> Result<usize, DataError> {
        let path = self.path_for(instrument);
        let mut reader = csv::Reader::from_path(&path).map_err(|source| DataError::Csv {
            path: path.clone(),
            source,
        })?;
        let mut n = 0;
        for record in reader.records() {
            record.map_err(|source| DataError::Csv {
                path: path.clone(),
                source,
            })?;
            n += 1;
        }
        Ok(n)
    }

    pub fn write(&self, instrument: &str, bars: &[Bar]) -> Result<PathBuf, DataError> {
        std::fs::create_dir_all(&self.root).map_err(|source| DataError::Io {
            path: self.root.clone(),
            source,
        })?;
        let path = self.path_for(instrument);
        let mut writer = csv::Writer::from_path(&path).map_err(|source| DataError::Csv {
            path: path.clone(),
            source,
        })?;
        for bar in bars {
            writer
                .serialize(CsvRowOut {
                    timestamp: bar.timestamp.to_rfc3339(),
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                })
                .map_err(|source| DataError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BarError;
    use chrono::TimeZone;
    use std::fs;

    fn write_raw(dir: &Path, instrument: &str, body: &str) {
        fs::write(dir.join(format!("{instrument}.csv")), body).unwrap();
    }

    #[test]
    fn loads_date_and_rfc3339_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(
            dir.path(),
            "SPY",
            "timestamp,open,high,low,close,volume\n\
             2024-01-02,100,101,99,100.5,1000\n\
             2024-01-03T00:00:00Z,100.5,102,100,101.5,1200\n",
        );
        let bars = CsvStore::new(dir.path()).load("SPY").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(bars[1].close, 101.5);
        assert_eq!(bars[1].symbol, "SPY");
    }

    #[test]
    fn blank_cell_is_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(
            dir.path(),
            "X",
            "timestamp,open,high,low,close,volume\n2024-01-02,100,101,99,,1000\n",
        );
        let err = CsvStore::new(dir.path()).load("X").unwrap_err();
        assert!(matches!(
            err,
            DataError::InvalidBar {
                source: BarError::MissingField { field: "close" },
                ..
            }
        ));
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(
            dir.path(),
            "X",
            "timestamp,open,high,low,close,volume\nyesterday,100,101,99,100,1000\n",
        );
        assert!(matches!(
            CsvStore::new(dir.path()).load("X"),
            Err(DataError::Malformed { row: 0, .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CsvStore::new(dir.path()).load("NOPE"),
            Err(DataError::NotFound { .. })
        ));
    }

    #[test]
    fn write_then_load_range_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..10)
            .map(|i| {
                let p = 10.0 + i as f64;
                Bar::new("AAA", base + chrono::Duration::hours(i), p, p + 1.0, p - 1.0, p, 5.0)
            })
            .collect();
        store.write("AAA", &bars).unwrap();
        store.write("BBB", &bars[..3]).unwrap();

        assert_eq!(store.instruments().unwrap(), vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(store.count("AAA").unwrap(), 10);
        let slice = store.load_range("AAA", 4, 3).unwrap();
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].close, 14.0);
        assert!(matches!(
            store.load_range("BBB", 2, 5),
            Err(DataError::InsufficientHistory { .. })
        ));
    }
}
