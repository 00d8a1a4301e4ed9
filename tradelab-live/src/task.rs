//! One live strategy instance: warm-up, subscribe, then process bars until
//! cancelled, the stream ends, or the feed stalls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tradelab_core::domain::{Bar, SignalId};
use tradelab_core::params::ParamValue;
use tradelab_core::strategy::{ConfiguredStrategy, Strategy};

use crate::buffer::RollingBuffer;
use crate::cancel::CancellationToken;
use crate::error::{LiveError, TaskExit};
use crate::feed::{BarStream, LiveFeed};
use crate::handler::{dispatch, SignalHandler};

/// Lifecycle of one configuration identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Stopped,
    Starting,
    Streaming,
    Cancelling,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub bars_processed: u64,
    pub signals_emitted: u64,
    pub handler_failures: u64,
    pub last_bar: Option<DateTime<Utc>>,
}

/// Published on the task's watch channel after every state or counter change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub stats: TaskStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskSettings {
    pub history_buffer_multiplier: usize,
    /// Lower bound of the no-bar watchdog.
    pub watchdog_min: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            history_buffer_multiplier: 2,
            watchdog_min: Duration::from_secs(300),
        }
    }
}

impl TaskSettings {
    /// Bars fetched at warm-up, also the rolling buffer capacity.
    pub fn warm_up_bars(&self, min_history: usize) -> usize {
        min_history * self.history_buffer_multiplier.max(1) + 10
    }

    pub fn watchdog(&self, interval: Option<&str>) -> Duration {
        match interval.and_then(parse_interval) {
            Some(bar) => self.watchdog_min.max(bar.saturating_mul(5)),
            None => self.watchdog_min,
        }
    }
}

/// Parse bar intervals such as `30s`, `5min`, `15m`, `1h`, `1hour`, `1d`, `1w`.
pub fn parse_interval(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = text.split_at(split);
    let n: u64 = digits.parse().ok()?;
    let secs = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "wk" | "week" | "weeks" => 604_800,
        _ => return None,
    };
    n.checked_mul(secs).map(Duration::from_secs)
}

/// Interval a configuration streams at: the explicit field, else the
/// `candle_interval` parameter.
pub fn effective_interval(strategy: &ConfiguredStrategy) -> Option<String> {
    let config = strategy.config();
    config.interval.clone().or_else(|| match config.params.get("candle_interval") {
        Some(ParamValue::Text(text)) => Some(text.clone()),
        _ => None,
    })
}

/// A strategy bound to its feed, handlers and status channel.
pub struct StrategyTask {
    strategy: Arc<ConfiguredStrategy>,
    feed: Arc<dyn LiveFeed>,
    handlers: Arc<[Arc<dyn SignalHandler>]>,
    settings: TaskSettings,
    cancel: CancellationToken,
    status: watch::Sender<TaskStatus>,
}

impl StrategyTask {
    pub fn new(
        strategy: Arc<ConfiguredStrategy>,
        feed: Arc<dyn LiveFeed>,
        handlers: Arc<[Arc<dyn SignalHandler>]>,
        settings: TaskSettings,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<TaskStatus>) {
        let (status, rx) = watch::channel(TaskStatus::default());
        (
            Self {
                strategy,
                feed,
                handlers,
                settings,
                cancel,
                status,
            },
            rx,
        )
    }

    /// Drive the task to completion. The published state is `Stopped` on
    /// every exit path.
    pub async fn run(self) -> TaskExit {
        let identity = self.strategy.config().identity();
        let mut stats = TaskStats::default();
        let exit = self.drive(&mut stats).await;
        self.publish(TaskState::Stopped, &stats);
        match &exit {
            TaskExit::Failed(err) => warn!(strategy = %identity, error = %err, "strategy task failed"),
            other => info!(strategy = %identity, exit = %other, bars = stats.bars_processed, "strategy task stopped"),
        }
        exit
    }

    fn publish(&self, state: TaskState, stats: &TaskStats) {
        // No receivers left is fine: the orchestrator dropped this task.
        let _ = self.status.send(TaskStatus {
            state,
            stats: stats.clone(),
        });
    }

    async fn drive(&self, stats: &mut TaskStats) -> TaskExit {
        let instrument = self.strategy.instrument().to_string();
        let interval = effective_interval(&self.strategy);
        let capacity = self.settings.warm_up_bars(self.strategy.min_history());
        let watchdog = self.settings.watchdog(interval.as_deref());

        self.publish(TaskState::Starting, stats);

        // ─── Warm-up ───
        let history = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TaskExit::Cancelled,
            warm = self.feed.warm_up(&instrument, interval.as_deref(), capacity) => match warm {
                Ok(bars) => bars,
                Err(err) => return TaskExit::Failed(LiveError::Feed(err)),
            },
        };
        let mut buffer = RollingBuffer::new(capacity);
        buffer.seed(history);
        debug!(instrument = %instrument, seeded = buffer.len(), capacity, "warm-up complete");

        // ─── Subscribe ───
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TaskExit::Cancelled,
            sub = self.feed.subscribe(&instrument, interval.as_deref()) => match sub {
                Ok(stream) => stream,
                Err(err) => return TaskExit::Failed(LiveError::Feed(err)),
            },
        };
        self.publish(TaskState::Streaming, stats);
        info!(
            strategy = %self.strategy.id(),
            instrument = %instrument,
            watchdog_secs = watchdog.as_secs(),
            "streaming"
        );

        // ─── Bar loop ───
        let mut next_signal_id = 1u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.publish(TaskState::Cancelling, stats);
                    release(&mut stream, &mut buffer);
                    return TaskExit::Cancelled;
                }
                next = tokio::time::timeout(watchdog, stream.next()) => next,
            };

            let bar = match next {
                Err(_) => {
                    release(&mut stream, &mut buffer);
                    return TaskExit::Failed(LiveError::Stalled(watchdog));
                }
                Ok(None) => {
                    buffer.clear();
                    return TaskExit::StreamEnded;
                }
                Ok(Some(Err(err))) => {
                    release(&mut stream, &mut buffer);
                    return TaskExit::Failed(LiveError::Feed(err));
                }
                Ok(Some(Ok(bar))) => bar,
            };

            if !self.accept(&instrument, bar, &mut buffer) {
                continue;
            }
            stats.bars_processed += 1;
            stats.last_bar = buffer.last().map(|b| b.timestamp);

            let enriched = self.strategy.process_data(buffer.as_slice());
            if let Some(mut signal) = self.strategy.evaluate(&enriched) {
                signal.id = SignalId(next_signal_id);
                next_signal_id += 1;
                let report = dispatch(&self.handlers, &signal).await;
                stats.signals_emitted += 1;
                stats.handler_failures += report.failed() as u64;
            }
            self.publish(TaskState::Streaming, stats);
        }
    }

    fn accept(&self, instrument: &str, bar: Bar, buffer: &mut RollingBuffer) -> bool {
        if bar.symbol != instrument {
            warn!(expected = %instrument, got = %bar.symbol, "bar for another instrument dropped");
            return false;
        }
        let ts = bar.timestamp;
        if !buffer.push(bar) {
            debug!(instrument = %instrument, timestamp = %ts, "stale bar dropped");
            return false;
        }
        true
    }
}

fn release(stream: &mut BarStream, buffer: &mut RollingBuffer) {
    stream.close();
    buffer.clear();
}
