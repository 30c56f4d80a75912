// Configuration management with layered configuration (file, env)

use crate::retry::{BackoffStrategy, RetryPolicy};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Upper bound on retention ages (one hundred years)
pub const MAX_RETENTION_HOURS: u64 = 100 * 365 * 24;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub retention: RetentionConfig,
    pub observability: ObservabilityConfig,
}

/// Which storage adapter the binary wires into the engine
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/deferred".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_seconds: u64,
    pub batch_size: usize,
    /// Reserved for executor-level parallelism; batches run sequentially
    pub concurrency: u32,
    pub execution_timeout_ms: u64,
    pub backoff_strategy: BackoffStrategy,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub default_max_retries: u32,
    /// Bound each poll's window below by the last checkpoint instead of the epoch
    pub checkpoint_window: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            batch_size: 100,
            concurrency: 3,
            execution_timeout_ms: 30_000,
            backoff_strategy: BackoffStrategy::Exponential,
            base_retry_delay_ms: 1_000,
            max_retry_delay_ms: 3_600_000,
            default_max_retries: crate::models::DEFAULT_MAX_RETRIES,
            checkpoint_window: false,
        }
    }
}

impl SchedulerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.backoff_strategy,
            Duration::from_millis(self.base_retry_delay_ms),
            Duration::from_millis(self.max_retry_delay_ms),
        )
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub endpoint: String,
    pub headers: HashMap<String, String>,
    pub bearer_token: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/tasks".to_string(),
            headers: HashMap::new(),
            bearer_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub completed_after_hours: u64,
    pub failed_after_hours: u64,
    pub interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            completed_after_hours: 7 * 24,
            failed_after_hours: 30 * 24,
            interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: None,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("DEFERRED")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.backend == StorageBackend::Postgres {
            if self.database.url.is_empty() {
                return Err("Database URL cannot be empty".to_string());
            }
            if self.database.max_connections == 0 {
                return Err("Database max_connections must be greater than 0".to_string());
            }
        }

        if self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }
        if self.scheduler.batch_size == 0 {
            return Err("Scheduler batch_size must be greater than 0".to_string());
        }
        if self.scheduler.concurrency == 0 {
            return Err("Scheduler concurrency must be greater than 0".to_string());
        }
        if self.scheduler.execution_timeout_ms == 0 {
            return Err("Scheduler execution_timeout_ms must be greater than 0".to_string());
        }
        if self.scheduler.default_max_retries > crate::models::MAX_RETRIES_LIMIT {
            return Err(format!(
                "Scheduler default_max_retries cannot exceed {}",
                crate::models::MAX_RETRIES_LIMIT
            ));
        }
        if self.scheduler.base_retry_delay_ms > self.scheduler.max_retry_delay_ms {
            return Err("Scheduler base_retry_delay_ms cannot exceed max_retry_delay_ms".to_string());
        }

        if self.executor.endpoint.is_empty() {
            return Err("Executor endpoint cannot be empty".to_string());
        }

        if self.retention.enabled && self.retention.interval_seconds == 0 {
            return Err("Retention interval_seconds must be greater than 0".to_string());
        }
        for (name, hours) in [
            ("completed_after_hours", self.retention.completed_after_hours),
            ("failed_after_hours", self.retention.failed_after_hours),
        ] {
            if hours > MAX_RETENTION_HOURS {
                return Err(format!(
                    "Retention {} cannot exceed {} hours",
                    name, MAX_RETENTION_HOURS
                ));
            }
        }

        Ok(())
    }
}
