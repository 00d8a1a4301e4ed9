//! Live bar feeds: a warm-up fetch, then a bounded stream of new bars.
//!
//! - `ChannelFeed`: bars pushed in by the caller. Used by tests and embedders.
//! - `ReplayFeed`: replays a CSV store as if it were live.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tradelab_core::data::CsvStore;
use tradelab_core::domain::Bar;

use crate::error::FeedError;

pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Receiving end of one subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct BarStream {
    rx: mpsc::Receiver<Result<Bar, FeedError>>,
}

impl BarStream {
    pub fn new(rx: mpsc::Receiver<Result<Bar, FeedError>>) -> Self {
        Self { rx }
    }

    /// Bounded stream and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<Bar, FeedError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    /// Next bar, or `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<Result<Bar, FeedError>> {
        self.rx.recv().await
    }

    /// Stop accepting bars. Already buffered bars are discarded with the stream.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Async counterpart of the backtest `DataProvider`.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Up to `bars` most recent bars before the stream starts, oldest first.
    async fn warm_up(&self, instrument: &str, interval: Option<&str>, bars: usize) -> Result<Vec<Bar>, FeedError>;

    async fn subscribe(&self, instrument: &str, interval: Option<&str>) -> Result<BarStream, FeedError>;
}

// ─── Channel feed ────────────────────────────────────────────────────

/// Warm-up history set up front; live bars pushed with [`ChannelFeed::publish`].
#[derive(Debug, Clone, Default)]
pub struct ChannelFeed {
    inner: Arc<Mutex<ChannelState>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct ChannelState {
    history: HashMap<String, Vec<Bar>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<Result<Bar, FeedError>>>>,
}

impl ChannelFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STREAM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_history(&self, instrument: &str, bars: Vec<Bar>) {
        self.state().history.insert(instrument.to_string(), bars);
    }

    /// Deliver `bar` to every open subscription for its instrument.
    /// Returns how many subscribers received it.
    pub async fn publish(&self, bar: Bar) -> usize {
        let senders: Vec<_> = {
            let mut state = self.state();
            let list = state.subscribers.entry(bar.symbol.clone()).or_default();
            list.retain(|tx| !tx.is_closed());
            list.clone()
        };
        let mut delivered = 0;
        for tx in senders {
            if tx.send(Ok(bar.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push an error into every subscription for `instrument`.
    pub async fn fail(&self, instrument: &str, message: &str) {
        let senders = self.state().subscribers.get(instrument).cloned().unwrap_or_default();
        for tx in senders {
            let _ = tx.send(Err(FeedError::Worker(message.to_string()))).await;
        }
    }

    /// Close every subscription for `instrument`; their streams end.
    pub fn end(&self, instrument: &str) {
        self.state().subscribers.remove(instrument);
    }

    /// Open subscriptions for `instrument`.
    pub fn subscriber_count(&self, instrument: &str) -> usize {
        self.state()
            .subscribers
            .get(instrument)
            .map_or(0, |list| list.iter().filter(|tx| !tx.is_closed()).count())
    }
}

#[async_trait]
impl LiveFeed for ChannelFeed {
    async fn warm_up(&self, instrument: &str, _interval: Option<&str>, bars: usize) -> Result<Vec<Bar>, FeedError> {
        let state = self.state();
        let history = state.history.get(instrument).map(Vec::as_slice).unwrap_or_default();
        Ok(history[history.len().saturating_sub(bars)..].to_vec())
    }

    async fn subscribe(&self, instrument: &str, _interval: Option<&str>) -> Result<BarStream, FeedError> {
        let (tx, stream) = BarStream::channel(self.capacity);
        self.state()
            .subscribers
            .entry(instrument.to_string())
            .or_default()
            .push(tx);
        Ok(stream)
    }
}

// ─── Replay feed ─────────────────────────────────────────────────────

/// Serves the head of a CSV file as warm-up and streams the rest.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    store: CsvStore,
    delay: Duration,
    capacity: usize,
    /// Bars already served as warm-up, per instrument.
    served: Arc<Mutex<HashMap<String, usize>>>,
}

impl ReplayFeed {
    pub fn new(store: CsvStore, delay: Duration) -> Self {
        Self {
            store,
            delay,
            capacity: DEFAULT_STREAM_CAPACITY,
            served: Arc::default(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    async fn load(&self, instrument: &str) -> Result<Vec<Bar>, FeedError> {
        let store = self.store.clone();
        let name = instrument.to_string();
        let bars = tokio::task::spawn_blocking(move || store.load(&name))
            .await
            .map_err(|e| FeedError::Worker(e.to_string()))??;
        Ok(bars)
    }
}

#[async_trait]
impl LiveFeed for ReplayFeed {
    async fn warm_up(&self, instrument: &str, _interval: Option<&str>, bars: usize) -> Result<Vec<Bar>, FeedError> {
        let mut all = self.load(instrument).await?;
        all.truncate(bars);
        self.served
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instrument.to_string(), all.len());
        Ok(all)
    }

    async fn subscribe(&self, instrument: &str, _interval: Option<&str>) -> Result<BarStream, FeedError> {
        let all = self.load(instrument).await?;
        let skip = self
            .served
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instrument)
            .copied()
            .unwrap_or(0);
        let (tx, stream) = BarStream::channel(self.capacity);
        let delay = self.delay;
        let name = instrument.to_string();

        tokio::spawn(async move {
            let total = all.len().saturating_sub(skip);
            for bar in all.into_iter().skip(skip) {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(bar)).await.is_err() {
                    debug!(instrument = %name, "replay subscriber gone");
                    return;
                }
            }
            if total == 0 {
                warn!(instrument = %name, "nothing left to replay after warm-up");
            }
            debug!(instrument = %name, bars = total, "replay finished");
        });
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn bars(n: usize) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let p = 10.0 + i as f64;
                Bar::new("SOLUSDT", base + ChronoDuration::minutes(5 * i as i64), p, p + 0.5, p - 0.5, p, 100.0)
            })
            .collect()
    }

    #[tokio::test]
    async fn channel_feed_warm_up_takes_the_tail() {
        let feed = ChannelFeed::new();
        feed.set_history("SOLUSDT", bars(10));
        let warm = feed.warm_up("SOLUSDT", None, 4).await.unwrap();
        assert_eq!(warm.len(), 4);
        assert_eq!(warm[0].close, 16.0);
        assert!(feed.warm_up("NOPE", None, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_feed_tracks_subscribers() {
        let feed = ChannelFeed::new();
        let mut stream = feed.subscribe("SOLUSDT", None).await.unwrap();
        assert_eq!(feed.subscriber_count("SOLUSDT"), 1);
        assert_eq!(feed.publish(bars(1).remove(0)).await, 1);
        assert!(stream.next().await.unwrap().is_ok());

        drop(stream);
        assert_eq!(feed.subscriber_count("SOLUSDT"), 0);
        assert_eq!(feed.publish(bars(1).remove(0)).await, 0);
    }

    #[tokio::test]
    async fn ended_stream_returns_none() {
        let feed = ChannelFeed::new();
        let mut stream = feed.subscribe("SOLUSDT", None).await.unwrap();
        feed.end("SOLUSDT");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_streams_what_warm_up_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        store.write("SOLUSDT", &bars(12)).unwrap();

        let feed = ReplayFeed::new(store, Duration::from_millis(50));
        let warm = feed.warm_up("SOLUSDT", Some("5min"), 8).await.unwrap();
        assert_eq!(warm.len(), 8);

        let mut stream = feed.subscribe("SOLUSDT", Some("5min")).await.unwrap();
        let mut streamed = Vec::new();
        while let Some(bar) = stream.next().await {
            streamed.push(bar.unwrap());
        }
        assert_eq!(streamed.len(), 4);
        assert_eq!(streamed[0].timestamp, bars(12)[8].timestamp);
    }
}
