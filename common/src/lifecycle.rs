// Task state machine
//
// pending -> in_progress (claim only) -> completed | pending (retry) | failed
// Nothing leaves completed or failed.

use crate::errors::StorageError;
use crate::models::{Task, TaskPatch, TaskStatus};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};

/// Whether the state machine allows moving from `from` to `to`
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;

    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (Pending, InProgress) | (InProgress, Completed) | (InProgress, Pending) | (InProgress, Failed)
    )
}

/// Check a caller-supplied patch against the task's current status.
///
/// `in_progress` can only be reached through `TaskStore::claim_tasks`, so a
/// patch may never set it on a task that is not already claimed.
pub fn validate_patch(current: &Task, patch: &TaskPatch) -> Result<(), StorageError> {
    let Some(to) = patch.status else {
        return Ok(());
    };

    let claim_bypass = to == TaskStatus::InProgress && current.status != TaskStatus::InProgress;
    if claim_bypass || !can_transition(current.status, to) {
        return Err(StorageError::InvalidTransition {
            task_id: current.id.to_string(),
            from: current.status.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// Patch for a claimed task whose execution succeeded
pub fn on_success(now: DateTime<Utc>) -> TaskPatch {
    TaskPatch {
        status: Some(TaskStatus::Completed),
        last_attempt_at: Some(Some(now)),
        next_attempt_at: Some(None),
        ..Default::default()
    }
}

/// Patch for a claimed task whose execution failed.
///
/// The retry count is incremented first; once it exceeds `max_retries` the
/// task fails permanently, otherwise it returns to `pending` with a backoff.
pub fn on_failure(task: &Task, policy: &RetryPolicy, now: DateTime<Utc>) -> TaskPatch {
    let retry_count = task.retry_count.saturating_add(1);

    let (status, next_attempt_at) = if retry_count > task.max_retries {
        (TaskStatus::Failed, None)
    } else {
        (
            TaskStatus::Pending,
            Some(policy.next_attempt_at(retry_count, now)),
        )
    };

    TaskPatch {
        status: Some(status),
        retry_count: Some(retry_count),
        last_attempt_at: Some(Some(now)),
        next_attempt_at: Some(next_attempt_at),
        ..Default::default()
    }
}
