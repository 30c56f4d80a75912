// Workflow builder: accumulates chained task drafts and persists them in one call

use crate::config::SchedulerConfig;
use crate::errors::{SchedulerError, ValidationError};
use crate::models::{Task, TaskDraft, DEFAULT_MAX_RETRIES};
use crate::storage::TaskStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

/// WorkflowBuilder collects an ordered sequence of drafts.
///
/// Each added draft becomes the `next_task_id` of the one before it. The link
/// is advisory: the engine does not hold a task back until its predecessor
/// completes.
pub struct WorkflowBuilder {
    store: Arc<dyn TaskStore>,
    drafts: Vec<TaskDraft>,
    default_max_retries: u32,
}

impl std::fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("drafts", &self.drafts)
            .field("default_max_retries", &self.default_max_retries)
            .finish_non_exhaustive()
    }
}

impl WorkflowBuilder {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            drafts: Vec::new(),
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Builder whose default retry ceiling is `scheduler.default_max_retries`
    pub fn from_config(store: Arc<dyn TaskStore>, config: &SchedulerConfig) -> Self {
        Self::new(store).with_default_max_retries(config.default_max_retries)
    }

    /// Retry ceiling applied by `add` when the caller passes `None`
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Append a task to the workflow
    pub fn add(
        &mut self,
        payload: serde_json::Value,
        scheduled_at: Option<DateTime<Utc>>,
        max_retries: Option<u32>,
    ) -> Result<&mut Self, SchedulerError> {
        let scheduled_at = scheduled_at
            .ok_or_else(|| ValidationError::MissingField("scheduled_at".to_string()))?;

        let draft = TaskDraft::new(payload, scheduled_at)
            .with_max_retries(max_retries.unwrap_or(self.default_max_retries));
        self.push(draft)
    }

    /// Append a fully built draft, e.g. one carrying metadata
    pub fn push(&mut self, draft: TaskDraft) -> Result<&mut Self, SchedulerError> {
        draft.validate()?;

        if let Some(previous) = self.drafts.last_mut() {
            previous.next_task_id = Some(draft.id);
        }
        self.drafts.push(draft);
        Ok(self)
    }

    pub fn drafts(&self) -> &[TaskDraft] {
        &self.drafts
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Persist every draft with a single bulk create.
    ///
    /// The builder is emptied on success. On failure nothing is assumed to be
    /// persisted and the drafts stay in place.
    #[instrument(skip(self), fields(count = self.drafts.len()))]
    pub async fn schedule(&mut self) -> Result<Vec<Task>, SchedulerError> {
        if self.drafts.is_empty() {
            return Ok(Vec::new());
        }

        let count = self.drafts.len();
        let tasks = self
            .store
            .create_tasks(self.drafts.clone())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, count, "Failed to schedule workflow");
                SchedulerError::persistence(format!("Failed to schedule {} tasks", count), e)
            })?;

        self.drafts.clear();
        tracing::info!(count = tasks.len(), "Workflow scheduled");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::models::TaskStatus;
    use crate::storage::{InMemoryTaskStore, MockTaskStore};
    use chrono::Duration;
    use serde_json::json;
    use std::error::Error as _;

    #[test]
    fn test_add_chains_drafts_in_order() {
        let mut builder = WorkflowBuilder::new(Arc::new(InMemoryTaskStore::new()));
        let now = Utc::now();

        builder
            .add(json!({"step": 1}), Some(now), None)
            .unwrap()
            .add(json!({"step": 2}), Some(now + Duration::minutes(5)), Some(0))
            .unwrap();

        let drafts = builder.drafts();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].next_task_id, Some(drafts[1].id));
        assert_eq!(drafts[1].next_task_id, None);
        assert_eq!(drafts[0].max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(drafts[1].max_retries, 0);
    }

    #[test]
    fn test_add_rejects_missing_fields() {
        let mut builder = WorkflowBuilder::new(Arc::new(InMemoryTaskStore::new()));

        let err = builder
            .add(serde_json::Value::Null, Some(Utc::now()), None)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SchedulerError::InvalidInput(ValidationError::MissingField(ref f)) if f == "payload"
        ));

        let err = builder.add(json!({}), None, None).err().unwrap();
        assert!(matches!(
            err,
            SchedulerError::InvalidInput(ValidationError::MissingField(ref f)) if f == "scheduled_at"
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_default_max_retries_override() {
        let mut builder =
            WorkflowBuilder::new(Arc::new(InMemoryTaskStore::new())).with_default_max_retries(7);
        builder.add(json!(1), Some(Utc::now()), None).unwrap();
        assert_eq!(builder.drafts()[0].max_retries, 7);
    }

    #[test]
    fn test_from_config_uses_configured_default_retries() {
        let config = SchedulerConfig {
            default_max_retries: 9,
            ..SchedulerConfig::default()
        };
        let mut builder = WorkflowBuilder::from_config(Arc::new(InMemoryTaskStore::new()), &config);
        builder
            .add(json!(1), Some(Utc::now()), None)
            .unwrap()
            .add(json!(2), Some(Utc::now()), Some(1))
            .unwrap();

        assert_eq!(builder.drafts()[0].max_retries, 9);
        assert_eq!(builder.drafts()[1].max_retries, 1);
    }

    #[test]
    fn test_add_rejects_unstorable_retry_ceiling() {
        let mut builder = WorkflowBuilder::new(Arc::new(MockTaskStore::new()));
        let err = builder
            .add(json!(1), Some(Utc::now()), Some(u32::MAX))
            .unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::InvalidInput(ValidationError::InvalidFieldValue { .. })
        ));
        assert!(builder.is_empty());
    }

    #[tokio::test]
    async fn test_empty_schedule_makes_no_storage_calls() {
        // No expectations: any storage call panics
        let mut builder = WorkflowBuilder::new(Arc::new(MockTaskStore::new()));
        assert!(builder.schedule().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_persists_and_clears() {
        let store = Arc::new(InMemoryTaskStore::new());
        let mut builder = WorkflowBuilder::new(store.clone());
        assert_eq!(builder.len(), 0);

        builder
            .push(
                TaskDraft::new(json!({"a": 1}), Utc::now()).with_metadata(json!({"tenant": "x"})),
            )
            .unwrap()
            .add(json!({"b": 2}), Some(Utc::now()), None)
            .unwrap();

        let tasks = builder.schedule().await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(tasks[0].next_task_id, Some(tasks[1].id));
        assert_eq!(tasks[0].metadata, Some(json!({"tenant": "x"})));
        assert!(builder.is_empty());
        assert!(store.get_task(tasks[1].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_schedule_failure_wraps_error_and_keeps_drafts() {
        let mut store = MockTaskStore::new();
        store
            .expect_create_tasks()
            .times(1)
            .returning(|_| Err(StorageError::DatabaseError("disk full".to_string())));

        let mut builder = WorkflowBuilder::new(Arc::new(store));
        builder.add(json!(1), Some(Utc::now()), None).unwrap();
        builder.add(json!(2), Some(Utc::now()), None).unwrap();

        let err = builder.schedule().await.unwrap_err();

        assert!(err.to_string().starts_with("Failed to schedule 2 tasks"));
        assert!(err.source().unwrap().to_string().contains("disk full"));
        assert_eq!(builder.len(), 2);
    }
}
