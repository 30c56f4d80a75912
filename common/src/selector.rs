// Due-task selection: narrows a fetched batch to tasks eligible right now

use crate::models::Task;
use chrono::{DateTime, Utc};

/// Whether a task is due at `now`.
///
/// A pending retry (`next_attempt_at`) takes precedence over the original
/// schedule; `scheduled_at` only applies while no retry has been set.
#[inline]
pub fn is_due(task: &Task, now: DateTime<Utc>) -> bool {
    task.effective_due_at() <= now
}

/// Keep the due tasks of a batch, preserving the batch order
pub fn select_due(tasks: &[Task], now: DateTime<Utc>) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| is_due(task, now))
        .cloned()
        .collect()
}
