// Error taxonomy for the scheduler core, storage adapters and executors

use thiserror::Error;

/// Errors surfaced to callers of `WorkflowBuilder::schedule` and `SyncEngine::sync`
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: StorageError,
    },
}

impl SchedulerError {
    /// Wrap a storage fault with a description of the operation that failed
    pub fn persistence(context: impl Into<String>, source: StorageError) -> Self {
        SchedulerError::Persistence {
            context: context.into(),
            source,
        }
    }
}

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Task execution errors, produced by executors and converted into attempt records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Execution timeout after {0} ms")]
    Timeout(u64),

    #[error("Endpoint rejected task with status {status_code}: {body}")]
    Rejected { status_code: u16, body: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Task execution failed: {0}")]
    Failed(String),
}

impl ExecutionError {
    /// Outcome code recorded for this failure: 408 for timeouts, the endpoint's
    /// status for rejections, 500 otherwise
    pub fn status_code(&self) -> u16 {
        match self {
            ExecutionError::Timeout(_) => 408,
            ExecutionError::Rejected { status_code, .. } => *status_code,
            ExecutionError::RequestFailed(_) | ExecutionError::Failed(_) => 500,
        }
    }
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Storage adapter errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("Value out of range for {field}: {value}")]
    OutOfRange { field: String, value: u64 },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::DatabaseError(err.to_string()),
        }
    }
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => StorageError::NotFound(msg),
            DatabaseError::ConnectionFailed(msg) => StorageError::ConnectionFailed(msg),
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}
