// Retention maintenance: removes terminal tasks once they age out

use crate::config::RetentionConfig;
use crate::errors::SchedulerError;
use crate::models::{PruneQuery, TaskStatus};
use crate::storage::TaskStore;
use crate::telemetry;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

/// Periodically prunes `completed` and `failed` tasks past their retention age
pub struct RetentionPruner {
    config: RetentionConfig,
    store: Arc<dyn TaskStore>,
}

impl RetentionPruner {
    pub fn new(config: RetentionConfig, store: Arc<dyn TaskStore>) -> Self {
        Self { config, store }
    }

    /// Run one pruning pass; returns the number of tasks removed
    #[instrument(skip(self))]
    pub async fn prune_once(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let mut total = 0;

        for (status, hours) in [
            (TaskStatus::Completed, self.config.completed_after_hours),
            (TaskStatus::Failed, self.config.failed_after_hours),
        ] {
            // An age reaching past the representable range keeps everything
            let Some(older_than) = i64::try_from(hours)
                .ok()
                .and_then(ChronoDuration::try_hours)
                .and_then(|age| now.checked_sub_signed(age))
            else {
                warn!(%status, hours, "Retention age out of range, skipping");
                continue;
            };
            let query = PruneQuery { status, older_than };
            let pruned = self.store.prune_tasks(query).await.map_err(|e| {
                SchedulerError::persistence(format!("Failed to prune {} tasks", status), e)
            })?;

            telemetry::record_pruned(&status.to_string(), pruned);
            total += pruned;
        }

        Ok(total)
    }

    /// Prune on every interval tick until a shutdown signal arrives
    #[instrument(skip_all)]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_seconds = self.config.interval_seconds,
            completed_after_hours = self.config.completed_after_hours,
            failed_after_hours = self.config.failed_after_hours,
            "Starting retention pruner"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.prune_once(Utc::now()).await {
                        Ok(0) => {}
                        Ok(pruned) => info!(pruned, "Pruned expired tasks"),
                        Err(e) => error!(error = %e, "Retention pass failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping retention pruner");
                    break;
                }
            }
        }
    }
}
