// Storage adapter contract and its implementations

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTaskStore;
pub use postgres::PostgresTaskStore;

use crate::errors::StorageError;
use crate::models::{
    AttemptResult, ListTasksQuery, PruneQuery, SyncCheckpoint, Task, TaskAttempt, TaskDraft,
    TaskPatch,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// TaskStore is everything the scheduler needs from a persistence backend
///
/// `claim_tasks` is the only cross-instance synchronization point: it must be
/// an atomic compare-and-set from `pending` to `in_progress`, so that two
/// concurrent claims over overlapping inputs partition them exactly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, draft: TaskDraft) -> Result<Task, StorageError>;

    /// Insert every draft or none of them
    async fn create_tasks(&self, drafts: Vec<TaskDraft>) -> Result<Vec<Task>, StorageError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StorageError>;

    /// Tasks in the query window, newest `scheduled_at` first
    async fn list_tasks(&self, query: ListTasksQuery) -> Result<Vec<Task>, StorageError>;

    /// Apply a patch and bump `updated_at`; rejects transitions the state machine forbids
    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StorageError>;

    /// Move the still-`pending` members of `tasks` to `in_progress`.
    ///
    /// Returns the claimed tasks in input order. Tasks already taken by another
    /// poller are left out without error.
    async fn claim_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>, StorageError>;

    async fn record_task_attempt(
        &self,
        task_id: Uuid,
        result: AttemptResult,
    ) -> Result<TaskAttempt, StorageError>;

    /// Attempts of one task, oldest first
    async fn list_task_attempts(&self, task_id: Uuid) -> Result<Vec<TaskAttempt>, StorageError>;

    async fn set_last_sync(
        &self,
        timestamp: DateTime<Utc>,
        total_tasks: u64,
    ) -> Result<(), StorageError>;

    /// Most recent checkpoint, or the epoch checkpoint when none was ever written
    async fn get_last_sync(&self) -> Result<SyncCheckpoint, StorageError>;

    /// Delete tasks in `query.status` not updated since `query.older_than`
    async fn prune_tasks(&self, query: PruneQuery) -> Result<u64, StorageError>;
}
