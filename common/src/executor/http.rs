// HTTP task executor: delivers a task's payload to a configured endpoint

use crate::config::ExecutorConfig;
use crate::errors::ExecutionError;
use crate::executor::{ExecutionSuccess, TaskExecutor};
use crate::models::Task;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// HttpTaskExecutor POSTs each task payload as JSON to a single endpoint
pub struct HttpTaskExecutor {
    client: Client,
    endpoint: String,
    headers: HashMap<String, String>,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpTaskExecutor {
    /// Create a new HttpTaskExecutor with the specified request timeout
    pub fn new(config: &ExecutorConfig, timeout: Duration) -> Result<Self, ExecutionError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ExecutionError::RequestFailed(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            headers: config.headers.clone(),
            bearer_token: config.bearer_token.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TaskExecutor for HttpTaskExecutor {
    #[tracing::instrument(skip(self, task), fields(task_id = %task.id, endpoint = %self.endpoint))]
    async fn execute(&self, task: &Task) -> Result<ExecutionSuccess, ExecutionError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("X-Task-Id", task.id.to_string())
            .header("X-Task-Attempt", task.retry_count.saturating_add(1).to_string())
            .json(&task.payload);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExecutionError::Timeout(self.timeout.as_millis() as u64)
            } else {
                ExecutionError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ExecutionError::RequestFailed(format!("Failed to read response body: {}", e))
        })?;

        tracing::debug!(status = status.as_u16(), body_len = body.len(), "Endpoint responded");

        if !status.is_success() {
            return Err(ExecutionError::Rejected {
                status_code: status.as_u16(),
                body,
            });
        }

        Ok(ExecutionSuccess {
            status_code: status.as_u16(),
            response: (!body.is_empty()).then_some(body),
        })
    }
}
