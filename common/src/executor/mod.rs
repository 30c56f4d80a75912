// Executor module for task execution
// Provides the executor contract and the timeout boundary the engine applies to it

pub mod http;

use crate::errors::ExecutionError;
use crate::models::{AttemptResult, Task};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// TaskExecutor performs the caller-defined work for a claimed task
///
/// Implementations must be cancel-safe: when the engine's execution timeout
/// elapses the returned future is dropped at its next await point.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<ExecutionSuccess, ExecutionError>;
}

/// Successful execution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSuccess {
    pub status_code: u16,
    pub response: Option<String>,
}

impl ExecutionSuccess {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            response: None,
        }
    }

    pub fn with_response(status_code: u16, response: impl Into<String>) -> Self {
        Self {
            status_code,
            response: Some(response.into()),
        }
    }
}

/// What one attempt produced, after the timeout boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(ExecutionSuccess),
    Failure(ExecutionError),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ExecutionOutcome::Success(success) => success.status_code,
            ExecutionOutcome::Failure(err) => err.status_code(),
        }
    }

    /// Build the attempt record for this outcome
    pub fn into_attempt(self, attempted_at: DateTime<Utc>, duration: Duration) -> AttemptResult {
        match self {
            ExecutionOutcome::Success(success) => AttemptResult {
                attempted_at,
                status_code: success.status_code,
                response: success.response,
                error: None,
                duration,
            },
            ExecutionOutcome::Failure(err) => AttemptResult {
                attempted_at,
                status_code: err.status_code(),
                response: None,
                error: Some(err.to_string()),
                duration,
            },
        }
    }
}

/// Run the executor under a time budget.
///
/// On expiry the in-flight future is dropped and the outcome is a 408 failure.
pub async fn execute_with_timeout(
    executor: &dyn TaskExecutor,
    task: &Task,
    limit: Duration,
) -> (ExecutionOutcome, Duration) {
    let started = Instant::now();
    let outcome = match timeout(limit, executor.execute(task)).await {
        Ok(Ok(success)) => ExecutionOutcome::Success(success),
        Ok(Err(err)) => ExecutionOutcome::Failure(err),
        Err(_) => ExecutionOutcome::Failure(ExecutionError::Timeout(limit.as_millis() as u64)),
    };
    (outcome, started.elapsed())
}
