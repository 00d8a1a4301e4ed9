//! Signal consumers and isolated fan-out.

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use tradelab_core::domain::Signal;

use crate::error::HandlerError;

/// Receives every signal a live task produces.
#[async_trait]
pub trait SignalHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, signal: &Signal) -> Result<(), HandlerError>;
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<(String, HandlerError)>,
}

impl DispatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Deliver `signal` to every handler concurrently. A handler that errors or
/// panics is logged and counted; the rest still receive the signal.
pub async fn dispatch(handlers: &[Arc<dyn SignalHandler>], signal: &Signal) -> DispatchReport {
    let deliveries = handlers.iter().map(|handler| async move {
        let outcome = AssertUnwindSafe(handler.handle(signal)).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
        };
        (handler.name().to_string(), result)
    });

    let mut report = DispatchReport::default();
    for (name, result) in join_all(deliveries).await {
        match result {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                warn!(
                    handler = %name,
                    strategy = %signal.strategy_id,
                    instrument = %signal.instrument,
                    error = %err,
                    "signal handler failed"
                );
                report.failures.push((name, err));
            }
        }
    }
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Reference handlers ──────────────────────────────────────────────

/// Logs each signal as a structured event.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHandler;

#[async_trait]
impl SignalHandler for ConsoleHandler {
    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&self, signal: &Signal) -> Result<(), HandlerError> {
        info!(
            id = %signal.id,
            strategy = %signal.strategy_id,
            instrument = %signal.instrument,
            direction = ?signal.direction,
            price = signal.price,
            timestamp = %signal.timestamp,
            "signal"
        );
        Ok(())
    }
}

/// Appends one JSON object per signal to a file.
#[derive(Debug)]
pub struct JsonlSignalSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlSignalSink {
    /// Open `path` for appending, creating it and its parent directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HandlerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SignalHandler for JsonlSignalSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn handle(&self, signal: &Signal) -> Result<(), HandlerError> {
        let mut line = serde_json::to_vec(signal)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tradelab_core::domain::SignalDirection;

    fn signal() -> Signal {
        Signal::new(
            "sma_cross",
            "BTCUSDT",
            SignalDirection::Long,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            64_000.0,
        )
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl SignalHandler for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        async fn handle(&self, _signal: &Signal) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl SignalHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn handle(&self, _signal: &Signal) -> Result<(), HandlerError> {
            Err(HandlerError::Rejected("downstream unavailable".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl SignalHandler for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn handle(&self, _signal: &Signal) -> Result<(), HandlerError> {
            panic!("handler bug")
        }
    }

    #[tokio::test]
    async fn second_of_three_failing_is_reported_once() {
        let first = Arc::new(Counting::default());
        let third = Arc::new(Counting::default());
        let handlers: Vec<Arc<dyn SignalHandler>> = vec![first.clone(), Arc::new(Failing), third.clone()];

        let report = dispatch(&handlers, &signal()).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(third.0.load(Ordering::SeqCst), 1);
        assert_eq!(report.failures[0].0, "failing");
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_others() {
        let good = Arc::new(Counting::default());
        let handlers: Vec<Arc<dyn SignalHandler>> = vec![Arc::new(Failing), good.clone(), Arc::new(Panicking)];

        let report = dispatch(&handlers, &signal()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(good.0.load(Ordering::SeqCst), 1);
        assert!(report
            .failures
            .iter()
            .any(|(name, err)| name == "panicking" && matches!(err, HandlerError::Panicked(m) if m == "handler bug")));
    }

    #[tokio::test]
    async fn no_handlers_is_a_no_op() {
        let report = dispatch(&[], &signal()).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("signals.jsonl");
        let sink = JsonlSignalSink::open(&path).await.unwrap();
        sink.handle(&signal()).await.unwrap();
        sink.handle(&signal()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Signal = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, signal());
    }
}
