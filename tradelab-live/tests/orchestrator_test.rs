//! Live orchestrator integration tests.
//!
//! Tests:
//! 1. Reconciliation diff: cancel what left, start what joined, leave the rest
//! 2. Re-polling an unchanged target does nothing
//! 3. Cancelled tasks drop their subscription and reach Stopped within grace
//! 4. A task whose stream ended is reaped and restarted on the next pass
//! 5. Invalid configurations are skipped without blocking valid ones
//! 6. A stalled feed trips the watchdog and the task is restarted
//! 7. Signals reach every handler even when one fails
//! 8. A failing config source skips the pass and the loop keeps running
//! 9. Shutdown stops every task

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tradelab_core::config::{StrategyConfig, StrategyIdentity};
use tradelab_core::domain::{Bar, Signal, SignalDirection, SignalId};
use tradelab_core::params::{ParamSet, ParamValue};
use tradelab_live::{
    CancellationToken, ChannelFeed, ConfigSource, HandlerError, Orchestrator, OrchestratorSettings, SignalHandler,
    SourceError, StaticConfigSource, TaskSettings, TaskState, TaskStatus,
};

// ──── Helpers ────

fn config(instrument: &str) -> StrategyConfig {
    let mut params = ParamSet::new();
    params.insert("sma_period".into(), ParamValue::Int(10));
    let mut config = StrategyConfig::new("sma_cross", instrument).with_params(params);
    config.interval = Some("1min".into());
    config
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        poll_interval: Duration::from_secs(10),
        grace: Duration::from_secs(5),
        task: TaskSettings::default(),
    }
}

fn orchestrator(
    source: &StaticConfigSource,
    feed: &Arc<ChannelFeed>,
    handlers: Vec<Arc<dyn SignalHandler>>,
) -> Orchestrator {
    Orchestrator::new(Arc::new(source.clone()), feed.clone(), handlers, settings())
}

fn hour(i: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(i)
}

/// Steadily falling closes: price sits below its SMA at the end.
fn falling_history(instrument: &str, n: i64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let c = 100.0 - i as f64 * 0.5;
            Bar::new(instrument, hour(i), c, c + 0.2, c - 0.2, c, 1_000.0)
        })
        .collect()
}

async fn wait_for_state(orch: &Orchestrator, id: &StrategyIdentity, state: TaskState) -> TaskStatus {
    let mut rx = orch.status_receiver(id).expect("task is active");
    let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == state))
        .await
        .expect("state reached in time")
        .expect("status channel open")
        .clone();
    status
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Signal>>,
}

#[async_trait]
impl SignalHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }
    async fn handle(&self, signal: &Signal) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

struct Broken;

#[async_trait]
impl SignalHandler for Broken {
    fn name(&self) -> &str {
        "broken"
    }
    async fn handle(&self, _signal: &Signal) -> Result<(), HandlerError> {
        Err(HandlerError::Rejected("sink offline".into()))
    }
}

/// Fails the first `failures` polls, then serves `configs`.
struct FlakySource {
    failures: usize,
    calls: AtomicUsize,
    configs: Vec<StrategyConfig>,
}

#[async_trait]
impl ConfigSource for FlakySource {
    async fn get_active_configs(&self) -> Result<Vec<StrategyConfig>, SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(SourceError::Io {
                path: "remote".into(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down"),
            });
        }
        Ok(self.configs.clone())
    }
}

// ──── 1–2. Reconciliation diff ────

#[tokio::test(start_paused = true)]
async fn scenario_a_cancels_x_starts_z_leaves_y() {
    let (x, y, z) = (config("XUSDT"), config("YUSDT"), config("ZUSDT"));
    let source = StaticConfigSource::new(vec![x.clone(), y.clone()]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());

    let first = orch.reconcile_once().await.unwrap();
    assert_eq!(first.started.len(), 2);
    let y_status = orch.status_receiver(&y.identity()).unwrap();

    source.set(vec![y.clone(), z.clone()]);
    let second = orch.reconcile_once().await.unwrap();
    assert_eq!(second.cancelled, vec![x.identity()]);
    assert_eq!(second.started, vec![z.identity()]);
    assert!(second.reaped.is_empty());
    assert!(orch.status_receiver(&y.identity()).unwrap().same_channel(&y_status));
    assert_eq!(
        orch.active_identities(),
        [y.identity(), z.identity()].into_iter().collect()
    );

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unchanged_target_is_a_no_op() {
    let source = StaticConfigSource::new(vec![config("AUSDT"), config("BUSDT"), config("AUSDT")]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());

    assert_eq!(orch.reconcile_once().await.unwrap().started.len(), 2);
    for _ in 0..3 {
        let report = orch.reconcile_once().await.unwrap();
        assert!(report.is_quiet(), "{report:?}");
    }
    assert_eq!(orch.len(), 2);
    orch.shutdown().await;
}

// ──── 3. Cancellation ────

#[tokio::test(start_paused = true)]
async fn cancelled_task_releases_subscription() {
    let cfg = config("CUSDT");
    let source = StaticConfigSource::new(vec![cfg.clone()]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());

    orch.reconcile_once().await.unwrap();
    wait_for_state(&orch, &cfg.identity(), TaskState::Streaming).await;
    let mut status = orch.status_receiver(&cfg.identity()).unwrap();
    assert_eq!(feed.subscriber_count("CUSDT"), 1);

    source.set(Vec::new());
    let report = orch.reconcile_once().await.unwrap();
    assert_eq!(report.cancelled, vec![cfg.identity()]);
    assert!(orch.is_empty());

    tokio::time::timeout(settings().grace, status.wait_for(|s| s.state == TaskState::Stopped))
        .await
        .expect("stopped within grace")
        .expect("final state published");
    assert_eq!(feed.subscriber_count("CUSDT"), 0);
}

// ──── 4. Restart policy ────

#[tokio::test(start_paused = true)]
async fn ended_stream_is_restarted_next_pass() {
    let cfg = config("DUSDT");
    let source = StaticConfigSource::new(vec![cfg.clone()]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());

    orch.reconcile_once().await.unwrap();
    wait_for_state(&orch, &cfg.identity(), TaskState::Streaming).await;

    feed.end("DUSDT");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = orch.reconcile_once().await.unwrap();
    assert_eq!(report.reaped, vec![cfg.identity()]);
    assert_eq!(report.started, vec![cfg.identity()]);
    wait_for_state(&orch, &cfg.identity(), TaskState::Streaming).await;
    assert_eq!(feed.subscriber_count("DUSDT"), 1);
    orch.shutdown().await;
}

// ──── 5. Validation ────

#[tokio::test(start_paused = true)]
async fn invalid_configs_are_skipped() {
    let good = config("EUSDT");
    let unknown = StrategyConfig::new("moon_shot", "EUSDT");
    let mut bad_params = ParamSet::new();
    bad_params.insert("sma_period".into(), ParamValue::Text("ten".into()));
    let mistyped = StrategyConfig::new("sma_cross", "FUSDT").with_params(bad_params);

    let source = StaticConfigSource::new(vec![unknown, good.clone(), mistyped]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());

    let report = orch.reconcile_once().await.unwrap();
    assert_eq!(report.started, vec![good.identity()]);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(orch.len(), 1);
    orch.shutdown().await;
}

// ──── 6. Watchdog ────

#[tokio::test(start_paused = true)]
async fn stalled_feed_trips_watchdog() {
    let cfg = config("GUSDT");
    let source = StaticConfigSource::new(vec![cfg.clone()]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());

    orch.reconcile_once().await.unwrap();
    let mut status = orch.status_receiver(&cfg.identity()).unwrap();
    status.wait_for(|s| s.state == TaskState::Streaming).await.unwrap();

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(status.borrow().state, TaskState::Stopped);
    assert_eq!(feed.subscriber_count("GUSDT"), 0);

    let report = orch.reconcile_once().await.unwrap();
    assert_eq!(report.reaped, vec![cfg.identity()]);
    assert_eq!(report.started, vec![cfg.identity()]);
    orch.shutdown().await;
}

// ──── 7. Signal fan-out ────

#[tokio::test(start_paused = true)]
async fn signals_reach_every_handler_despite_failures() {
    let cfg = config("HUSDT");
    let feed = Arc::new(ChannelFeed::new());
    feed.set_history("HUSDT", falling_history("HUSDT", 40));

    let first = Arc::new(Recorder::default());
    let third = Arc::new(Recorder::default());
    let handlers: Vec<Arc<dyn SignalHandler>> = vec![first.clone(), Arc::new(Broken), third.clone()];
    let source = StaticConfigSource::new(vec![cfg.clone()]);
    let mut orch = orchestrator(&source, &feed, handlers);

    orch.reconcile_once().await.unwrap();
    let mut status = orch.status_receiver(&cfg.identity()).unwrap();
    status.wait_for(|s| s.state == TaskState::Streaming).await.unwrap();

    assert_eq!(feed.publish(Bar::new("HUSDT", hour(40), 95.0, 130.0, 94.0, 130.0, 5_000.0)).await, 1);
    let stats = status
        .wait_for(|s| s.stats.bars_processed == 1)
        .await
        .unwrap()
        .stats
        .clone();

    assert_eq!(stats.signals_emitted, 1);
    assert_eq!(stats.handler_failures, 1);
    for recorder in [&first, &third] {
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, SignalId(1));
        assert_eq!(seen[0].direction, SignalDirection::Long);
        assert_eq!(seen[0].timestamp, hour(40));
    }

    // A stale bar is dropped without touching the counters.
    feed.publish(Bar::new("HUSDT", hour(39), 1.0, 1.0, 1.0, 1.0, 1.0)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(status.borrow().stats.bars_processed, 1);

    let snapshot = orch.snapshot();
    assert_eq!(snapshot[&cfg.identity()].stats.signals_emitted, 1);
    orch.shutdown().await;
}

// ──── 8–9. Loop and shutdown ────

#[tokio::test(start_paused = true)]
async fn source_failure_skips_pass_and_loop_continues() {
    let source = Arc::new(FlakySource {
        failures: 2,
        calls: AtomicUsize::new(0),
        configs: vec![config("IUSDT")],
    });
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = Orchestrator::new(source.clone(), feed.clone(), Vec::new(), settings());

    let token = CancellationToken::new();
    let stopper = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(35)).await;
        stopper.cancel();
    });

    let report = orch.run(token).await;
    assert!(source.calls.load(Ordering::SeqCst) >= 3);
    assert_eq!(report.stopped, 1);
    assert_eq!(report.aborted, 0);
    assert!(orch.is_empty());
    assert_eq!(feed.subscriber_count("IUSDT"), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_everything() {
    let source = StaticConfigSource::new(vec![config("JUSDT"), config("KUSDT")]);
    let feed = Arc::new(ChannelFeed::new());
    let mut orch = orchestrator(&source, &feed, Vec::new());
    orch.reconcile_once().await.unwrap();

    let report = orch.shutdown().await;
    assert_eq!(report.stopped, 2);
    assert_eq!(report.aborted, 0);
    assert!(orch.snapshot().is_empty());
}
