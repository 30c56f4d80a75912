// Sync engine: polls for due tasks, claims them, executes them and records outcomes

use crate::config::SchedulerConfig;
use crate::errors::{ExecutionError, SchedulerError};
use crate::executor::{execute_with_timeout, ExecutionOutcome, TaskExecutor};
use crate::lifecycle;
use crate::models::{ListTasksQuery, Task, TaskStatus};
use crate::retry::RetryPolicy;
use crate::selector::select_due;
use crate::storage::TaskStore;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Runtime settings of a sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Maximum number of tasks fetched per batch
    pub batch_size: usize,
    pub execution_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Start each poll window at the last checkpoint instead of the epoch
    pub checkpoint_window: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SyncConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            batch_size: config.batch_size,
            execution_timeout: config.execution_timeout(),
            retry_policy: config.retry_policy(),
            checkpoint_window: config.checkpoint_window,
        }
    }
}

/// Scheduler trait for the polling lifecycle
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run `sync` on every poll tick until `stop` is called
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Signal the polling loop to exit once the in-flight sync finishes
    async fn stop(&self) -> Result<(), SchedulerError>;

    /// Process every task currently due; returns the tasks this call claimed
    async fn sync(&self) -> Result<Vec<Task>, SchedulerError>;
}

/// Clears the processing flag on every exit path of `sync`
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Main sync engine implementation
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    processing: AtomicBool,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            store,
            executor,
            processing: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn window_start(&self, checkpoint: DateTime<Utc>) -> DateTime<Utc> {
        if self.config.checkpoint_window {
            checkpoint
        } else {
            DateTime::<Utc>::default()
        }
    }

    /// Execute one claimed task and persist its outcome.
    ///
    /// Storage failures here are logged and count as a failed task; they never
    /// abort the batch.
    #[instrument(skip(self, task), fields(task_id = %task.id, attempt = task.retry_count.saturating_add(1)))]
    async fn process_task(&self, task: &Task) -> bool {
        let attempted_at = Utc::now();
        let (outcome, duration) =
            execute_with_timeout(self.executor.as_ref(), task, self.config.execution_timeout).await;
        let finished_at = Utc::now();

        telemetry::record_task_duration(duration.as_secs_f64());

        let patch = match &outcome {
            ExecutionOutcome::Success(_) => {
                telemetry::record_task_success();
                lifecycle::on_success(finished_at)
            }
            ExecutionOutcome::Failure(err) => {
                telemetry::record_task_failure(failure_reason(err));
                warn!(error = %err, status_code = err.status_code(), "Task execution failed");
                lifecycle::on_failure(task, &self.config.retry_policy, finished_at)
            }
        };
        let succeeded = outcome.is_success();

        // The attempt record is written whether or not the task row update went
        // through; the audit trail never depends on the mutable row.
        let updated = match self.store.update_task(task.id, patch).await {
            Ok(updated) => {
                debug!(
                    status = %updated.status,
                    retry_count = updated.retry_count,
                    next_attempt_at = ?updated.next_attempt_at,
                    "Task outcome persisted"
                );
                if updated.status == TaskStatus::Failed {
                    warn!(retry_count = updated.retry_count, "Task exhausted its retries");
                }
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to persist task outcome");
                false
            }
        };

        let recorded = match self
            .store
            .record_task_attempt(task.id, outcome.into_attempt(attempted_at, duration))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Failed to record task attempt");
                false
            }
        };

        succeeded && updated && recorded
    }
}

fn failure_reason(err: &ExecutionError) -> &'static str {
    match err {
        ExecutionError::Timeout(_) => "timeout",
        ExecutionError::Rejected { .. } => "rejected",
        ExecutionError::RequestFailed(_) | ExecutionError::Failed(_) => "error",
    }
}

#[async_trait]
impl Scheduler for SyncEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), SchedulerError> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Starting sync engine"
        );

        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.sync().await {
                        Ok(processed) if !processed.is_empty() => {
                            info!(tasks_processed = processed.len(), "Processed due tasks");
                        }
                        Ok(_) => debug!("No tasks due"),
                        Err(e) => error!(error = %e, "Sync failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping sync engine");
                    break;
                }
            }
        }

        info!("Sync engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), SchedulerError> {
        info!("Stopping sync engine");

        // No receivers just means the loop was never started
        let _ = self.shutdown_tx.send(());

        while self.is_processing() {
            sleep(Duration::from_millis(50)).await;
        }

        info!("Sync engine stopped gracefully");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sync(&self) -> Result<Vec<Task>, SchedulerError> {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!("Sync already in progress, skipping");
            return Ok(Vec::new());
        };

        let mut processed: Vec<Task> = Vec::new();

        loop {
            let checkpoint = self
                .store
                .get_last_sync()
                .await
                .map_err(|e| SchedulerError::persistence("Failed to read sync checkpoint", e))?;

            let now = Utc::now();
            let query = ListTasksQuery::since(self.window_start(checkpoint.timestamp))
                .until(now)
                .with_status(TaskStatus::Pending)
                .with_limit(self.config.batch_size);

            let batch = self
                .store
                .list_tasks(query)
                .await
                .map_err(|e| SchedulerError::persistence("Failed to list pending tasks", e))?;
            if batch.is_empty() {
                break;
            }

            let due = select_due(&batch, now);
            if due.is_empty() {
                debug!(fetched = batch.len(), "No fetched task is due yet");
                break;
            }

            let claimed = self
                .store
                .claim_tasks(due)
                .await
                .map_err(|e| SchedulerError::persistence("Failed to claim tasks", e))?;
            if claimed.is_empty() {
                debug!("All due tasks were claimed elsewhere");
                break;
            }
            telemetry::record_sync_claimed(claimed.len());

            let mut failed = 0usize;
            for task in &claimed {
                if !self.process_task(task).await {
                    failed += 1;
                }
            }
            info!(
                claimed = claimed.len(),
                succeeded = claimed.len() - failed,
                failed,
                "Batch processed"
            );

            processed.extend(claimed);

            self.store
                .set_last_sync(now, processed.len() as u64)
                .await
                .map_err(|e| SchedulerError::persistence("Failed to write sync checkpoint", e))?;
        }

        Ok(processed)
    }
}
