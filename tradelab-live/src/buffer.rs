//! Fixed-capacity bar window for one live task.

use std::collections::VecDeque;

use tradelab_core::domain::Bar;

/// Most recent `capacity` bars in arrival order.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            bars: VecDeque::with_capacity(capacity),
        }
    }

    /// Replace the contents with the tail of `history`.
    pub fn seed(&mut self, history: Vec<Bar>) {
        self.bars.clear();
        let skip = history.len().saturating_sub(self.capacity);
        self.bars.extend(history.into_iter().skip(skip));
    }

    /// Append `bar`, evicting the oldest when full. A bar not strictly newer
    /// than the last one is dropped and `false` returned.
    pub fn push(&mut self, bar: Bar) -> bool {
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        true
    }

    pub fn as_slice(&mut self) -> &[Bar] {
        self.bars.make_contiguous()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every bar and the allocation behind them.
    pub fn clear(&mut self) {
        self.bars = VecDeque::new();
    }
}
