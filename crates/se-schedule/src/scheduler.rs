//! Cron loop driving the sync, metrics and retention jobs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use se_core::{Metrics, SyncConfig, SyncOutcome, VolumetryResult};
use se_sync::{CancelSignal, MetricsCollector, Reconciler, RetentionPruner};

use crate::config::{JobKind, ScheduleConfig, ScheduleTask};
use crate::error::Result;

/// What a finished job produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Sync(SyncOutcome),
    Metrics(Metrics),
    Volumetry(VolumetryResult),
    Cleanup { removed: usize },
}

/// Runs one job kind against the shared engine components
pub struct JobRunner {
    reconciler: Arc<Reconciler>,
    collector: Arc<MetricsCollector>,
    pruner: Arc<RetentionPruner>,
    sample_size: usize,
    sync_retry_attempts: u32,
    retry_delay: Duration,
}

impl JobRunner {
    pub fn new(
        reconciler: Arc<Reconciler>,
        collector: Arc<MetricsCollector>,
        pruner: Arc<RetentionPruner>,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            reconciler,
            collector,
            pruner,
            sample_size: sync.sample_size,
            sync_retry_attempts: sync.retry_attempts,
            retry_delay: Duration::from_secs(sync.retry_delay_secs),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run `task` once, retrying fatal failures within its budget
    pub async fn run(&self, task: &ScheduleTask, cancel: &CancelSignal) -> Result<JobReport> {
        let attempts = task.retry_attempts.unwrap_or(match task.job {
            JobKind::Sync => self.sync_retry_attempts,
            other => other.default_retry_attempts(),
        });

        with_retry(&task.name, attempts, self.retry_delay, cancel, || {
            self.run_once(task, cancel)
        })
        .await
    }

    async fn run_once(&self, task: &ScheduleTask, cancel: &CancelSignal) -> Result<JobReport> {
        match task.job {
            JobKind::Sync => {
                let sample_size = task.sample_size.unwrap_or(self.sample_size);
                let outcome = self.reconciler.run_with_cancel(sample_size, cancel).await?;
                Ok(JobReport::Sync(outcome))
            }
            JobKind::Metrics => {
                let metrics = self.collector.collect_metrics().await;
                if let Some(ref e) = metrics.error {
                    warn!(task = %task.name, "Metrics collected with errors: {}", e);
                }
                Ok(JobReport::Metrics(metrics))
            }
            JobKind::Volumetry => {
                let result = self.collector.analyze_volumetry().await;
                if !result.success {
                    warn!(task = %task.name, "Volumetry analysis had problems: {:?}", result.metrics.error);
                }
                Ok(JobReport::Volumetry(result))
            }
            JobKind::Cleanup => {
                let removed = self.pruner.prune(Utc::now())?;
                Ok(JobReport::Cleanup { removed })
            }
        }
    }
}

/// Call `op` until it succeeds, at most `1 + retries` times, waiting
/// `delay * attempt` between attempts. Stops early once `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    name: &str,
    retries: u32,
    delay: Duration,
    cancel: &CancelSignal,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && !cancel.is_cancelled() => {
                attempt += 1;
                let wait = delay * attempt;
                warn!(task = %name, "Attempt {} failed: {}. Retrying in {:?}", attempt, e, wait);
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// A signal that fires when the scheduler is stopped
    pub fn cancel_signal(&self) -> CancelSignal {
        CancelSignal::from_receiver(self.shutdown_tx.subscribe())
    }

    /// Stop the scheduler and wait for running jobs to wind down
    pub async fn stop(self) {
        self.shutdown_tx.send_replace(true);
        joined("scheduler", self.handle.await);
    }
}

/// Cron scheduler
pub struct Scheduler {
    config: ScheduleConfig,
    runner: Arc<JobRunner>,
}

impl Scheduler {
    /// Fails when any enabled job has an invalid cron expression
    pub fn new(config: ScheduleConfig, runner: Arc<JobRunner>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let tasks: Vec<ScheduleTask> =
                self.config.enabled_tasks().into_iter().cloned().collect();
            info!("Scheduler started ({} jobs)", tasks.len());

            let mut task_handles = Vec::new();
            for task in tasks {
                let runner = Arc::clone(&self.runner);
                let rx = shutdown_rx.clone();
                let name = task.name.clone();
                let handle = tokio::spawn(async move {
                    run_schedule_task(task, runner, rx).await;
                });
                task_handles.push((name, handle));
            }

            for (name, handle) in task_handles {
                joined(&name, handle.await);
            }

            info!("Scheduler stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Log a task that panicked or was aborted. Returns whether it ended cleanly.
fn joined(name: &str, result: std::result::Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!(task = %name, "Scheduled task panicked: {}", e);
            false
        }
        Err(e) => {
            error!(task = %name, "Scheduled task did not finish: {}", e);
            false
        }
    }
}

async fn run_schedule_task(
    task: ScheduleTask,
    runner: Arc<JobRunner>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let schedule = match task.schedule() {
        Ok(s) => s,
        Err(e) => {
            error!(task = %task.name, "{}", e);
            return;
        }
    };
    let cancel = CancelSignal::from_receiver(shutdown_rx.clone());

    info!(task = %task.name, cron = %task.cron, job = %task.job, "Scheduled job registered");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let now = Utc::now();
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!(task = %task.name, "No upcoming run time");
            break;
        };

        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(
            task = %task.name,
            next = %next.format("%Y-%m-%d %H:%M:%S"),
            "Waiting for next run"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                info!(task = %task.name, "Running scheduled job");
                match runner.run(&task, &cancel).await {
                    Ok(report) => log_report(&task, &report),
                    Err(e) => error!(task = %task.name, "Job failed: {}", e),
                }
            }
            _ = shutdown_rx.changed() => {
                info!(task = %task.name, "Shutdown requested");
                break;
            }
        }
    }
}

fn log_report(task: &ScheduleTask, report: &JobReport) {
    match report {
        JobReport::Sync(outcome) => info!(
            task = %task.name,
            users_created = outcome.users_created,
            users_updated = outcome.users_updated,
            events_synced = outcome.events_synced,
            cancelled = outcome.cancelled,
            "Sync finished"
        ),
        JobReport::Metrics(metrics) => info!(
            task = %task.name,
            total_users = metrics.total_users,
            total_events = metrics.total_events,
            sampled_users = metrics.sampled_users,
            "Metrics collected"
        ),
        JobReport::Volumetry(result) => info!(
            task = %task.name,
            success = result.success,
            duration_ms = result.metrics.duration_ms,
            "Volumetry analyzed"
        ),
        JobReport::Cleanup { removed } => {
            info!(task = %task.name, removed = *removed, "Cleanup finished")
        }
    }
}
