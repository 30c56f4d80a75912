// SQL query constants shared by the Postgres task store

/// SQL query fragments for the tasks table
pub mod task_queries {
    /// All columns for tasks, in `Task` field order
    pub const SELECT_ALL_COLUMNS: &str = r#"id, payload, scheduled_at, status, retry_count,
        max_retries, last_attempt_at, next_attempt_at, created_at, updated_at,
        metadata, next_task_id"#;
}

/// SQL query fragments for the task_attempts table
pub mod attempt_queries {
    pub const SELECT_ALL_COLUMNS: &str =
        "id, task_id, attempted_at, status_code, response, error, duration_ms";
}
