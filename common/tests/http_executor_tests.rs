// Tests for the HTTP task executor against a mock endpoint

use chrono::Utc;
use common::config::ExecutorConfig;
use common::errors::ExecutionError;
use common::executor::http::HttpTaskExecutor;
use common::executor::{execute_with_timeout, TaskExecutor};
use common::models::{Task, TaskDraft};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor_for(server: &MockServer, headers: HashMap<String, String>) -> HttpTaskExecutor {
    let config = ExecutorConfig {
        endpoint: format!("{}/tasks", server.uri()),
        headers,
        bearer_token: Some("secret-token".to_string()),
    };
    HttpTaskExecutor::new(&config, Duration::from_secs(5)).unwrap()
}

fn task() -> Task {
    let now = Utc::now();
    Task::from_draft(TaskDraft::new(json!({"kind": "email", "to": "a@b.c"}), now), now)
}

#[tokio::test]
async fn test_posts_payload_with_task_headers() {
    let server = MockServer::start().await;
    let task = task();

    Mock::given(method("POST"))
        .and(path("/tasks"))
        .and(header("X-Task-Id", task.id.to_string().as_str()))
        .and(header("X-Task-Attempt", "1"))
        .and(header("X-Source", "scheduler"))
        .and(header("Authorization", "Bearer secret-token"))
        .and(body_json(json!({"kind": "email", "to": "a@b.c"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(
        &server,
        HashMap::from([("X-Source".to_string(), "scheduler".to_string())]),
    );
    let success = executor.execute(&task).await.unwrap();

    assert_eq!(success.status_code, 200);
    assert_eq!(success.response.as_deref(), Some("queued"));
    server.verify().await;
}

#[tokio::test]
async fn test_retry_attempt_header_counts_previous_failures() {
    let server = MockServer::start().await;
    let mut task = task();
    task.retry_count = 2;

    Mock::given(method("POST"))
        .and(header("X-Task-Attempt", "3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let success = executor_for(&server, HashMap::new())
        .execute(&task)
        .await
        .unwrap();

    assert_eq!(success.status_code, 204);
    assert!(success.response.is_none());
}

#[tokio::test]
async fn test_attempt_header_saturates_at_max_retry_count() {
    let server = MockServer::start().await;
    let mut task = task();
    task.retry_count = u32::MAX;

    Mock::given(method("POST"))
        .and(header("X-Task-Attempt", u32::MAX.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let success = executor_for(&server, HashMap::new())
        .execute(&task)
        .await
        .unwrap();
    assert_eq!(success.status_code, 200);
}

#[tokio::test]
async fn test_non_success_status_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = executor_for(&server, HashMap::new())
        .execute(&task())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ExecutionError::Rejected {
            status_code: 503,
            body: "overloaded".to_string()
        }
    );
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_slow_endpoint_times_out_with_408() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let executor = executor_for(&server, HashMap::new());
    let (outcome, _) =
        execute_with_timeout(&executor, &task(), Duration::from_millis(100)).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.status_code(), 408);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_500() {
    let config = ExecutorConfig {
        endpoint: "http://127.0.0.1:1/tasks".to_string(),
        headers: HashMap::new(),
        bearer_token: None,
    };
    let executor = HttpTaskExecutor::new(&config, Duration::from_secs(2)).unwrap();

    let err = executor.execute(&task()).await.unwrap_err();
    assert!(matches!(err, ExecutionError::RequestFailed(_)));
    assert_eq!(err.status_code(), 500);
}
