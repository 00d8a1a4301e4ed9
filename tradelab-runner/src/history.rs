//! Historical bar access for the optimizer.
//!
//! Both providers expose the same common timeline: every instrument is
//! trimmed to the shortest history, keeping its most recent bars, so index
//! `i` addresses the same position from the end on every instrument.
//!
//! - `EagerProvider` loads everything up front (in parallel) and hands out
//!   zero-copy views of shared `Arc<[Bar]>` buffers.
//! - `LazyProvider` reads each requested slice from the CSV store on demand.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;
use tracing::{debug, info, warn};

use tradelab_core::data::{CsvStore, DataError};
use tradelab_core::domain::Bar;

/// Read-only view of a range of a shared bar buffer.
#[derive(Clone)]
pub struct BarSlice {
    bars: Arc<[Bar]>,
    range: Range<usize>,
}

impl BarSlice {
    pub fn new(bars: Arc<[Bar]>, range: Range<usize>) -> Self {
        debug_assert!(range.end <= bars.len());
        Self { bars, range }
    }

    pub fn owned(bars: Vec<Bar>) -> Self {
        let len = bars.len();
        Self {
            bars: Arc::from(bars),
            range: 0..len,
        }
    }
}

impl Deref for BarSlice {
    type Target = [Bar];

    fn deref(&self) -> &[Bar] {
        &self.bars[self.range.clone()]
    }
}

impl fmt::Debug for BarSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarSlice")
            .field("range", &self.range)
            .field("len", &self.len())
            .finish()
    }
}

/// Source of per-instrument history slices on a common timeline.
pub trait HistoryProvider: Send + Sync {
    fn instruments(&self) -> &[String];

    /// Length of the common timeline.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bars `range` of the common timeline for `instrument`.
    fn slice(&self, instrument: &str, range: Range<usize>) -> Result<BarSlice, DataError>;
}

fn check_range(instrument: &str, range: &Range<usize>, len: usize) -> Result<(), DataError> {
    if range.end > len || range.start > range.end {
        return Err(DataError::InsufficientHistory {
            instrument: instrument.to_string(),
            requested: range.end,
            available: len,
        });
    }
    Ok(())
}

/// First occurrence of each name, in order. Repeats are logged and dropped.
fn unique(instruments: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(instruments.len());
    for name in instruments {
        if seen.contains(name) {
            warn!(instrument = %name, "duplicate instrument ignored");
        } else {
            seen.push(name.clone());
        }
    }
    seen
}

fn unknown(instrument: &str) -> DataError {
    DataError::WrongInstrument {
        served: "none".into(),
        requested: instrument.to_string(),
    }
}

// ─── Eager ───────────────────────────────────────────────────────────

/// All history in memory, loaded once.
#[derive(Debug, Clone)]
pub struct EagerProvider {
    instruments: Vec<String>,
    bars: BTreeMap<String, Arc<[Bar]>>,
    len: usize,
}

impl EagerProvider {
    /// Load every instrument from `store` in parallel.
    pub fn load(store: &CsvStore, instruments: &[String]) -> Result<Self, DataError> {
        let loaded: Vec<(String, Vec<Bar>)> = unique(instruments)
            .into_par_iter()
            .map(|instrument| store.load(&instrument).map(|bars| (instrument, bars)))
            .collect::<Result<_, _>>()?;
        let provider = Self::from_bars(loaded);
        info!(
            instruments = provider.instruments.len(),
            bars = provider.len,
            "history loaded"
        );
        Ok(provider)
    }

    /// Build from already loaded bars, trimming to the common length.
    /// A repeated instrument keeps its first entry.
    pub fn from_bars(loaded: Vec<(String, Vec<Bar>)>) -> Self {
        let names: Vec<String> = loaded.iter().map(|(name, _)| name.clone()).collect();
        let instruments = unique(&names);
        let mut taken = BTreeMap::new();
        for (name, bars) in loaded {
            taken.entry(name).or_insert(bars);
        }
        let loaded: Vec<(String, Vec<Bar>)> = instruments
            .iter()
            .filter_map(|name| taken.remove(name).map(|bars| (name.clone(), bars)))
            .collect();
        let len = loaded.iter().map(|(_, bars)| bars.len()).min().unwrap_or(0);
        let bars = loaded
            .into_iter()
            .map(|(name, mut bars)| {
                let skip = bars.len() - len;
                if skip > 0 {
                    debug!(instrument = %name, skipped = skip, "trimmed to common length");
                }
                let tail = bars.split_off(skip);
                (name, Arc::<[Bar]>::from(tail))
            })
            .collect();
        Self { instruments, bars, len }
    }
}

impl HistoryProvider for EagerProvider {
    fn instruments(&self) -> &[String] {
        &self.instruments
    }

    fn len(&self) -> usize {
        self.len
    }

    fn slice(&self, instrument: &str, range: Range<usize>) -> Result<BarSlice, DataError> {
        let bars = self.bars.get(instrument).ok_or_else(|| unknown(instrument))?;
        check_range(instrument, &range, self.len)?;
        Ok(BarSlice::new(Arc::clone(bars), range))
    }
}

// ─── Lazy ────────────────────────────────────────────────────────────

/// Reads each slice from disk when asked.
#[derive(Debug, Clone)]
pub struct LazyProvider {
    store: CsvStore,
    instruments: Vec<String>,
    /// Bars dropped from the front of each file to reach the common length.
    offsets: BTreeMap<String, usize>,
    len: usize,
}

impl LazyProvider {
    /// Count bars per instrument; the data itself is read later.
    pub fn open(store: CsvStore, instruments: &[String]) -> Result<Self, DataError> {
        let instruments = unique(instruments);
        let counts = instruments
            .iter()
            .map(|i| store.count(i).map(|n| (i.clone(), n)))
            .collect::<Result<Vec<_>, _>>()?;
        let len = counts.iter().map(|(_, n)| *n).min().unwrap_or(0);
        let offsets = counts.into_iter().map(|(i, n)| (i, n - len)).collect();
        Ok(Self {
            store,
            instruments,
            offsets,
            len,
        })
    }
}

impl HistoryProvider for LazyProvider {
    fn instruments(&self) -> &[String] {
        &self.instruments
    }

    fn len(&self) -> usize {
        self.len
    }

    fn slice(&self, instrument: &str, range: Range<usize>) -> Result<BarSlice, DataError> {
        let offset = *self.offsets.get(instrument).ok_or_else(|| unknown(instrument))?;
        check_range(instrument, &range, self.len)?;
        let bars = self
            .store
            .load_range(instrument, offset + range.start, range.len())?;
        Ok(BarSlice::owned(bars))
    }
}
