use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Retry ceiling applied to drafts that do not set one explicitly
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest retry ceiling a backend can store; `retry_count` may reach one past it
pub const MAX_RETRIES_LIMIT: u32 = i32::MAX as u32 - 1;

// ============================================================================
// Task Models
// ============================================================================

/// TaskStatus represents where a task is in its lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// Task is a persisted unit of scheduled work
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Task {
    pub id: Uuid,
    /// Caller-defined data, never inspected by the engine
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "i32")]
    pub retry_count: u32,
    #[sqlx(try_from = "i32")]
    pub max_retries: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    /// Advisory link to the task enqueued right after this one in the same workflow
    pub next_task_id: Option<Uuid>,
}

impl Task {
    /// Materialize a draft the way every backend does on insert
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: draft.id,
            payload: draft.payload,
            scheduled_at: draft.scheduled_at,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: draft.max_retries,
            last_attempt_at: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
            metadata: draft.metadata,
            next_task_id: draft.next_task_id,
        }
    }

    /// Time at which the task next becomes eligible; a pending retry supersedes
    /// the original schedule
    pub fn effective_due_at(&self) -> DateTime<Utc> {
        self.next_attempt_at.unwrap_or(self.scheduled_at)
    }
}

/// TaskDraft is a not-yet-persisted task produced on the client side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDraft {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: u32,
    pub metadata: Option<serde_json::Value>,
    pub next_task_id: Option<Uuid>,
}

impl TaskDraft {
    /// Create a draft with a fresh client-side id and the default retry ceiling
    pub fn new(payload: serde_json::Value, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            scheduled_at,
            max_retries: DEFAULT_MAX_RETRIES,
            metadata: None,
            next_task_id: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// A draft must carry a payload (`null` counts as absent) and a storable
    /// retry ceiling
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.payload.is_null() {
            return Err(ValidationError::MissingField("payload".to_string()));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_retries".to_string(),
                reason: format!("must not exceed {}", MAX_RETRIES_LIMIT),
            });
        }
        Ok(())
    }
}

/// Partial update applied through `TaskStore::update_task`
///
/// Nullable columns use `Option<Option<_>>`: the outer `None` leaves the column
/// untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<Option<DateTime<Utc>>>,
    pub next_attempt_at: Option<Option<DateTime<Utc>>>,
    pub metadata: Option<Option<serde_json::Value>>,
}

impl TaskPatch {
    /// Apply the patch to an in-memory copy of a task
    pub fn apply_to(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(retry_count) = self.retry_count {
            task.retry_count = retry_count;
        }
        if let Some(max_retries) = self.max_retries {
            task.max_retries = max_retries;
        }
        if let Some(scheduled_at) = self.scheduled_at {
            task.scheduled_at = scheduled_at;
        }
        if let Some(last_attempt_at) = self.last_attempt_at {
            task.last_attempt_at = last_attempt_at;
        }
        if let Some(next_attempt_at) = self.next_attempt_at {
            task.next_attempt_at = next_attempt_at;
        }
        if let Some(metadata) = &self.metadata {
            task.metadata = metadata.clone();
        }
        task.updated_at = now;
    }
}

// ============================================================================
// Attempt Models
// ============================================================================

/// Outcome of one execution attempt, as handed to `TaskStore::record_task_attempt`
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    pub attempted_at: DateTime<Utc>,
    pub status_code: u16,
    pub response: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl AttemptResult {
    /// Success-class outcomes are 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// TaskAttempt is an append-only audit record of one execution attempt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TaskAttempt {
    pub id: Uuid,
    pub task_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    #[sqlx(try_from = "i32")]
    pub status_code: u16,
    pub response: Option<String>,
    pub error: Option<String>,
    #[sqlx(try_from = "i64")]
    pub duration_ms: u64,
}

impl TaskAttempt {
    pub fn from_result(task_id: Uuid, result: AttemptResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            attempted_at: result.attempted_at,
            status_code: result.status_code,
            response: result.response,
            error: result.error,
            duration_ms: result.duration.as_millis().min(u64::MAX as u128) as u64,
        }
    }
}

// ============================================================================
// Sync Checkpoint
// ============================================================================

/// SyncCheckpoint marks the last processed window and how many tasks it covered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub timestamp: DateTime<Utc>,
    pub total_tasks: u64,
}

impl Default for SyncCheckpoint {
    fn default() -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            total_tasks: 0,
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Time-windowed, status-filtered, paginated read over `scheduled_at`
///
/// The window is half-open: `from <= scheduled_at < to`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListTasksQuery {
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListTasksQuery {
    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from,
            to: None,
            status: None,
            limit: None,
            offset: None,
        }
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether a task falls inside the window and matches the status filter
    pub fn matches(&self, task: &Task) -> bool {
        task.scheduled_at >= self.from
            && self.to.map_or(true, |to| task.scheduled_at < to)
            && self.status.map_or(true, |status| task.status == status)
    }
}

/// Bulk-delete filter for retention maintenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneQuery {
    pub status: TaskStatus,
    /// Tasks last updated strictly before this instant are removed
    pub older_than: DateTime<Utc>,
}
