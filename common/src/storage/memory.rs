// In-memory task store, used by tests and single-process deployments

use crate::errors::StorageError;
use crate::lifecycle;
use crate::models::{
    AttemptResult, ListTasksQuery, PruneQuery, SyncCheckpoint, Task, TaskAttempt, TaskDraft,
    TaskPatch, TaskStatus,
};
use crate::storage::TaskStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

#[derive(Default)]
struct State {
    /// Insertion order is kept so equal `scheduled_at` values list stably
    tasks: Vec<Task>,
    attempts: Vec<TaskAttempt>,
    checkpoints: Vec<SyncCheckpoint>,
}

/// InMemoryTaskStore keeps everything behind one async mutex.
///
/// Holding the lock across a whole `claim_tasks` call is what makes the claim atomic.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    #[instrument(skip(self, draft), fields(task_id = %draft.id))]
    async fn create_task(&self, draft: TaskDraft) -> Result<Task, StorageError> {
        let mut created = self.create_tasks(vec![draft]).await?;
        created
            .pop()
            .ok_or_else(|| StorageError::QueryFailed("Insert returned no task".to_string()))
    }

    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    async fn create_tasks(&self, drafts: Vec<TaskDraft>) -> Result<Vec<Task>, StorageError> {
        let mut state = self.state.lock().await;

        // Check every id up front so a conflict leaves nothing behind
        let mut seen: HashSet<Uuid> = state.tasks.iter().map(|t| t.id).collect();
        for draft in &drafts {
            if !seen.insert(draft.id) {
                return Err(StorageError::DatabaseError(format!(
                    "Duplicate task id: {}",
                    draft.id
                )));
            }
        }

        let now = Utc::now();
        let created: Vec<Task> = drafts
            .into_iter()
            .map(|draft| Task::from_draft(draft, now))
            .collect();
        state.tasks.extend(created.iter().cloned());

        tracing::debug!(count = created.len(), "Tasks created");
        Ok(created)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, query: ListTasksQuery) -> Result<Vec<Task>, StorageError> {
        let state = self.state.lock().await;

        let mut matching: Vec<&Task> = state.tasks.iter().filter(|t| query.matches(t)).collect();
        // Stable sort keeps insertion order among equal timestamps
        matching.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));

        Ok(matching
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    #[instrument(skip(self, patch), fields(task_id = %id))]
    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StorageError> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("Task not found: {}", id)))?;

        lifecycle::validate_patch(task, &patch)?;
        patch.apply_to(task, Utc::now());
        Ok(task.clone())
    }

    #[instrument(skip(self, tasks), fields(requested = tasks.len()))]
    async fn claim_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>, StorageError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut claimed = Vec::with_capacity(tasks.len());

        for requested in &tasks {
            if let Some(task) = state
                .tasks
                .iter_mut()
                .find(|t| t.id == requested.id && t.status == TaskStatus::Pending)
            {
                task.status = TaskStatus::InProgress;
                task.updated_at = now;
                claimed.push(task.clone());
            }
        }

        tracing::debug!(claimed = claimed.len(), "Tasks claimed");
        Ok(claimed)
    }

    async fn record_task_attempt(
        &self,
        task_id: Uuid,
        result: AttemptResult,
    ) -> Result<TaskAttempt, StorageError> {
        let attempt = TaskAttempt::from_result(task_id, result);
        self.state.lock().await.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn list_task_attempts(&self, task_id: Uuid) -> Result<Vec<TaskAttempt>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn set_last_sync(
        &self,
        timestamp: DateTime<Utc>,
        total_tasks: u64,
    ) -> Result<(), StorageError> {
        self.state.lock().await.checkpoints.push(SyncCheckpoint {
            timestamp,
            total_tasks,
        });
        Ok(())
    }

    async fn get_last_sync(&self) -> Result<SyncCheckpoint, StorageError> {
        let state = self.state.lock().await;
        Ok(state.checkpoints.last().copied().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn prune_tasks(&self, query: PruneQuery) -> Result<u64, StorageError> {
        let mut state = self.state.lock().await;
        let before = state.tasks.len();
        state
            .tasks
            .retain(|t| !(t.status == query.status && t.updated_at < query.older_than));
        Ok((before - state.tasks.len()) as u64)
    }
}
