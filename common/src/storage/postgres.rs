// PostgreSQL task store

use crate::db::queries::{attempt_queries, task_queries};
use crate::db::DbPool;
use crate::errors::StorageError;
use crate::lifecycle;
use crate::models::{
    AttemptResult, ListTasksQuery, PruneQuery, SyncCheckpoint, Task, TaskAttempt, TaskDraft,
    TaskPatch, TaskStatus,
};
use crate::storage::TaskStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Task store backed by the `tasks`, `task_attempts` and `sync_checkpoints` tables
#[derive(Clone)]
pub struct PostgresTaskStore {
    pool: DbPool,
}

impl PostgresTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_task<'e, E>(executor: E, task: &Task) -> Result<(), StorageError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, payload, scheduled_at, status, retry_count, max_retries,
                last_attempt_at, next_attempt_at, created_at, updated_at,
                metadata, next_task_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id)
        .bind(&task.payload)
        .bind(task.scheduled_at)
        .bind(task.status.to_string())
        .bind(to_db_int("retry_count", task.retry_count)?)
        .bind(to_db_int("max_retries", task.max_retries)?)
        .bind(task.last_attempt_at)
        .bind(task.next_attempt_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(&task.metadata)
        .bind(task.next_task_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}

/// Counters are `u32` in memory but `INTEGER` in the schema
fn to_db_int(field: &str, value: u32) -> Result<i32, StorageError> {
    i32::try_from(value).map_err(|_| StorageError::OutOfRange {
        field: field.to_string(),
        value: u64::from(value),
    })
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, draft), fields(task_id = %draft.id))]
    async fn create_task(&self, draft: TaskDraft) -> Result<Task, StorageError> {
        let task = Task::from_draft(draft, Utc::now());
        Self::insert_task(self.pool.pool(), &task).await?;

        tracing::info!(task_id = %task.id, scheduled_at = %task.scheduled_at, "Task created");
        Ok(task)
    }

    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    async fn create_tasks(&self, drafts: Vec<TaskDraft>) -> Result<Vec<Task>, StorageError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let tasks: Vec<Task> = drafts
            .into_iter()
            .map(|draft| Task::from_draft(draft, now))
            .collect();

        let mut tx = self.pool.pool().begin().await?;
        for task in &tasks {
            Self::insert_task(&mut *tx, task).await?;
        }
        tx.commit().await?;

        tracing::info!(count = tasks.len(), "Tasks created");
        Ok(tasks)
    }

    #[instrument(skip(self))]
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StorageError> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE id = $1",
            task_queries::SELECT_ALL_COLUMNS
        );
        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(task)
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, query: ListTasksQuery) -> Result<Vec<Task>, StorageError> {
        let mut sql = format!(
            "SELECT {} FROM tasks WHERE scheduled_at >= $1",
            task_queries::SELECT_ALL_COLUMNS
        );
        let mut param_count = 2;

        if query.to.is_some() {
            sql.push_str(&format!(" AND scheduled_at < ${}", param_count));
            param_count += 1;
        }
        if query.status.is_some() {
            sql.push_str(&format!(" AND status = ${}", param_count));
        }

        // created_at then id keeps ties in insertion order across pages
        sql.push_str(" ORDER BY scheduled_at DESC, created_at ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        let mut query_builder = sqlx::query_as::<_, Task>(&sql).bind(query.from);
        if let Some(to) = query.to {
            query_builder = query_builder.bind(to);
        }
        if let Some(status) = query.status {
            query_builder = query_builder.bind(status.to_string());
        }

        let tasks = query_builder.fetch_all(self.pool.pool()).await?;

        tracing::debug!(count = tasks.len(), "Listed tasks");
        Ok(tasks)
    }

    #[instrument(skip(self, patch), fields(task_id = %id))]
    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StorageError> {
        let mut tx = self.pool.pool().begin().await?;

        let sql = format!(
            "SELECT {} FROM tasks WHERE id = $1 FOR UPDATE",
            task_queries::SELECT_ALL_COLUMNS
        );
        let mut task = sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Task not found: {}", id)))?;

        lifecycle::validate_patch(&task, &patch)?;
        patch.apply_to(&mut task, Utc::now());

        sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                retry_count = $3,
                max_retries = $4,
                scheduled_at = $5,
                last_attempt_at = $6,
                next_attempt_at = $7,
                metadata = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(task.status.to_string())
        .bind(to_db_int("retry_count", task.retry_count)?)
        .bind(to_db_int("max_retries", task.max_retries)?)
        .bind(task.scheduled_at)
        .bind(task.last_attempt_at)
        .bind(task.next_attempt_at)
        .bind(&task.metadata)
        .bind(task.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(task_id = %task.id, status = %task.status, "Task updated");
        Ok(task)
    }

    #[instrument(skip(self, tasks), fields(requested = tasks.len()))]
    async fn claim_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>, StorageError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = $1, updated_at = NOW()
            WHERE id = ANY($2) AND status = $3
            RETURNING {}
            "#,
            task_queries::SELECT_ALL_COLUMNS
        );

        let claimed = sqlx::query_as::<_, Task>(&sql)
            .bind(TaskStatus::InProgress.to_string())
            .bind(&ids)
            .bind(TaskStatus::Pending.to_string())
            .fetch_all(self.pool.pool())
            .await?;

        // RETURNING order is unspecified; restore the caller's order
        let mut by_id: HashMap<Uuid, Task> = claimed.into_iter().map(|t| (t.id, t)).collect();
        let ordered: Vec<Task> = ids.iter().filter_map(|id| by_id.remove(id)).collect();

        tracing::debug!(claimed = ordered.len(), "Tasks claimed");
        Ok(ordered)
    }

    #[instrument(skip(self, result), fields(task_id = %task_id, status_code = result.status_code))]
    async fn record_task_attempt(
        &self,
        task_id: Uuid,
        result: AttemptResult,
    ) -> Result<TaskAttempt, StorageError> {
        let attempt = TaskAttempt::from_result(task_id, result);

        sqlx::query(
            r#"
            INSERT INTO task_attempts (
                id, task_id, attempted_at, status_code, response, error, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.task_id)
        .bind(attempt.attempted_at)
        .bind(i32::from(attempt.status_code))
        .bind(&attempt.response)
        .bind(&attempt.error)
        .bind(attempt.duration_ms as i64)
        .execute(self.pool.pool())
        .await?;

        Ok(attempt)
    }

    #[instrument(skip(self))]
    async fn list_task_attempts(&self, task_id: Uuid) -> Result<Vec<TaskAttempt>, StorageError> {
        let sql = format!(
            "SELECT {} FROM task_attempts WHERE task_id = $1 ORDER BY seq ASC",
            attempt_queries::SELECT_ALL_COLUMNS
        );
        let attempts = sqlx::query_as::<_, TaskAttempt>(&sql)
            .bind(task_id)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(attempts)
    }

    #[instrument(skip(self))]
    async fn set_last_sync(
        &self,
        timestamp: DateTime<Utc>,
        total_tasks: u64,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO sync_checkpoints (synced_at, total_tasks) VALUES ($1, $2)")
            .bind(timestamp)
            .bind(total_tasks as i64)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_last_sync(&self) -> Result<SyncCheckpoint, StorageError> {
        let row: Option<(DateTime<Utc>, i64)> = sqlx::query_as(
            "SELECT synced_at, total_tasks FROM sync_checkpoints ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row
            .map(|(timestamp, total_tasks)| SyncCheckpoint {
                timestamp,
                total_tasks: total_tasks.max(0) as u64,
            })
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn prune_tasks(&self, query: PruneQuery) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM tasks WHERE status = $1 AND updated_at < $2")
            .bind(query.status.to_string())
            .bind(query.older_than)
            .execute(self.pool.pool())
            .await?;

        tracing::info!(
            status = %query.status,
            pruned = result.rows_affected(),
            "Pruned tasks"
        );
        Ok(result.rows_affected())
    }
}
