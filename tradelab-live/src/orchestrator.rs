//! Reconciliation loop: keeps one running task per target configuration.
//!
//! Each pass:
//! 1. Health check: finished tasks are reaped and logged.
//! 2. Poll the config source. A failure skips the pass.
//! 3. Validate each configuration. Invalid ones are logged and skipped.
//! 4. Diff identities: cancel what left the target, start what joined it.

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tradelab_core::config::{StrategyConfig, StrategyIdentity};
use tradelab_core::strategy::{build_strategy, ConfiguredStrategy};

use crate::cancel::CancellationToken;
use crate::config::OrchestratorSettings;
use crate::config_source::ConfigSource;
use crate::error::{SourceError, TaskExit};
use crate::feed::LiveFeed;
use crate::handler::SignalHandler;
use crate::task::{StrategyTask, TaskStatus};

/// Pure set difference between what runs and what should run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_start: Vec<StrategyIdentity>,
    pub to_cancel: Vec<StrategyIdentity>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_start.is_empty() && self.to_cancel.is_empty()
    }
}

pub fn plan_reconciliation(
    active: &BTreeSet<StrategyIdentity>,
    target: &BTreeSet<StrategyIdentity>,
) -> ReconcilePlan {
    ReconcilePlan {
        to_start: target.difference(active).cloned().collect(),
        to_cancel: active.difference(target).cloned().collect(),
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub reaped: Vec<StrategyIdentity>,
    pub started: Vec<StrategyIdentity>,
    pub cancelled: Vec<StrategyIdentity>,
    /// Configurations that failed validation, with the reason.
    pub skipped: Vec<(StrategyIdentity, String)>,
}

impl ReconcileReport {
    /// No task was started, cancelled or reaped.
    pub fn is_quiet(&self) -> bool {
        self.reaped.is_empty() && self.started.is_empty() && self.cancelled.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: usize,
    pub aborted: usize,
}

struct ActiveTask {
    config: StrategyConfig,
    cancel: CancellationToken,
    status: watch::Receiver<TaskStatus>,
    handle: JoinHandle<TaskExit>,
}

pub struct Orchestrator {
    source: Arc<dyn ConfigSource>,
    feed: Arc<dyn LiveFeed>,
    handlers: Arc<[Arc<dyn SignalHandler>]>,
    settings: OrchestratorSettings,
    active: BTreeMap<StrategyIdentity, ActiveTask>,
    /// Grace-bounded waits on cancelled tasks.
    stopping: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ConfigSource>,
        feed: Arc<dyn LiveFeed>,
        handlers: Vec<Arc<dyn SignalHandler>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            source,
            feed,
            handlers: Arc::from(handlers),
            settings,
            active: BTreeMap::new(),
            stopping: Vec::new(),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn active_identities(&self) -> BTreeSet<StrategyIdentity> {
        self.active.keys().cloned().collect()
    }

    pub fn active_config(&self, identity: &StrategyIdentity) -> Option<&StrategyConfig> {
        self.active.get(identity).map(|t| &t.config)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Current state and counters of every active task.
    pub fn snapshot(&self) -> BTreeMap<StrategyIdentity, TaskStatus> {
        self.active
            .iter()
            .map(|(id, task)| (id.clone(), task.status.borrow().clone()))
            .collect()
    }

    pub fn status_receiver(&self, identity: &StrategyIdentity) -> Option<watch::Receiver<TaskStatus>> {
        self.active.get(identity).map(|t| t.status.clone())
    }

    /// Run passes every poll interval until `shutdown` fires, then stop all tasks.
    pub async fn run(&mut self, shutdown: CancellationToken) -> ShutdownReport {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_secs = self.settings.poll_interval.as_secs(),
            grace_secs = self.settings.grace.as_secs(),
            "orchestrator running"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.reconcile_once().await {
                Ok(report) if !report.is_quiet() => info!(
                    started = report.started.len(),
                    cancelled = report.cancelled.len(),
                    reaped = report.reaped.len(),
                    active = self.active.len(),
                    "reconciled"
                ),
                Ok(_) => debug!(active = self.active.len(), "no changes"),
                Err(err) => warn!(error = %err, "config source failed; pass skipped"),
            }
        }
        self.shutdown().await
    }

    /// One health check plus one diff against the config source.
    pub async fn reconcile_once(&mut self) -> Result<ReconcileReport, SourceError> {
        let mut report = ReconcileReport {
            reaped: self.reap_finished().await,
            ..ReconcileReport::default()
        };
        self.stopping.retain(|h| !h.is_finished());

        let configs = self.source.get_active_configs().await?;

        // ─── Validate ───
        let mut target: BTreeMap<StrategyIdentity, Option<Arc<ConfiguredStrategy>>> = BTreeMap::new();
        for config in configs {
            let identity = config.identity();
            if target.contains_key(&identity) {
                debug!(strategy = %identity, "duplicate configuration ignored");
                continue;
            }
            if self.active.contains_key(&identity) {
                target.insert(identity, None);
                continue;
            }
            match build_strategy(&config) {
                Ok(strategy) => {
                    target.insert(identity, Some(Arc::new(strategy)));
                }
                Err(err) => {
                    warn!(strategy = %identity, error = %err, "invalid configuration skipped");
                    report.skipped.push((identity, err.to_string()));
                }
            }
        }

        // ─── Diff ───
        let wanted: BTreeSet<_> = target.keys().cloned().collect();
        let plan = plan_reconciliation(&self.active_identities(), &wanted);

        for identity in plan.to_cancel {
            if let Some(task) = self.active.remove(&identity) {
                self.cancel_task(identity.clone(), task);
                report.cancelled.push(identity);
            }
        }
        for identity in plan.to_start {
            if let Some(Some(strategy)) = target.remove(&identity) {
                self.start_task(identity.clone(), strategy);
                report.started.push(identity);
            }
        }
        Ok(report)
    }

    /// Cancel every task, wait up to the grace period for each, abort the rest.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let grace = self.settings.grace;
        let tasks: Vec<_> = std::mem::take(&mut self.active).into_iter().collect();
        for (_, task) in &tasks {
            task.cancel.cancel();
        }

        let waits = tasks.into_iter().map(|(identity, mut task)| async move {
            match tokio::time::timeout(grace, &mut task.handle).await {
                Ok(exit) => {
                    log_exit(&identity, exit);
                    false
                }
                Err(_) => {
                    task.handle.abort();
                    warn!(strategy = %identity, "task ignored cancellation; aborted");
                    true
                }
            }
        });
        let outcomes = join_all(waits).await;
        let aborted = outcomes.iter().filter(|a| **a).count();

        for stopper in std::mem::take(&mut self.stopping) {
            let _ = stopper.await;
        }

        let report = ShutdownReport {
            stopped: outcomes.len() - aborted,
            aborted,
        };
        info!(stopped = report.stopped, aborted = report.aborted, "orchestrator stopped");
        report
    }

    async fn reap_finished(&mut self) -> Vec<StrategyIdentity> {
        let finished: Vec<_> = self
            .active
            .iter()
            .filter(|(_, t)| t.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        let mut reaped = Vec::with_capacity(finished.len());
        for identity in finished {
            if let Some(task) = self.active.remove(&identity) {
                log_exit(&identity, task.handle.await);
                reaped.push(identity);
            }
        }
        reaped
    }

    fn start_task(&mut self, identity: StrategyIdentity, strategy: Arc<ConfiguredStrategy>) {
        let config = strategy.config().clone();
        let cancel = CancellationToken::new();
        let (task, status) = StrategyTask::new(
            strategy,
            Arc::clone(&self.feed),
            Arc::clone(&self.handlers),
            self.settings.task,
            cancel.clone(),
        );
        let handle = tokio::spawn(task.run());
        info!(strategy = %identity, "task started");
        self.active.insert(
            identity,
            ActiveTask {
                config,
                cancel,
                status,
                handle,
            },
        );
    }

    /// Signal the task and wait for it off the reconciliation path.
    fn cancel_task(&mut self, identity: StrategyIdentity, task: ActiveTask) {
        task.cancel.cancel();
        let grace = self.settings.grace;
        let mut handle = task.handle;
        info!(strategy = %identity, "task cancelled");
        self.stopping.push(tokio::spawn(async move {
            if let Ok(exit) = tokio::time::timeout(grace, &mut handle).await {
                log_exit(&identity, exit);
            } else {
                handle.abort();
                warn!(strategy = %identity, grace_secs = grace.as_secs(), "task did not stop within grace; aborted");
            }
        }));
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn log_exit(identity: &StrategyIdentity, joined: Result<TaskExit, tokio::task::JoinError>) {
    match joined {
        Ok(TaskExit::Failed(err)) => warn!(strategy = %identity, error = %err, "task failed"),
        Ok(exit) => info!(strategy = %identity, exit = %exit, "task finished"),
        Err(err) if err.is_panic() => error!(strategy = %identity, "task panicked"),
        Err(_) => debug!(strategy = %identity, "task aborted"),
    }
}
