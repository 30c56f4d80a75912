// Scheduler binary entry point

use anyhow::Context;
use common::config::{Settings, StorageBackend};
use common::db::DbPool;
use common::executor::http::HttpTaskExecutor;
use common::executor::TaskExecutor;
use common::scheduler::{RetentionPruner, Scheduler, SyncConfig, SyncEngine};
use common::storage::{InMemoryTaskStore, PostgresTaskStore, TaskStore};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!(
        backend = ?settings.storage.backend,
        endpoint = %settings.executor.endpoint,
        batch_size = settings.scheduler.batch_size,
        "Starting deferred task scheduler"
    );

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let (store, db_pool): (Arc<dyn TaskStore>, Option<DbPool>) = match settings.storage.backend {
        StorageBackend::Postgres => {
            let pool = DbPool::new(&settings.database)
                .await
                .context("Failed to initialize database pool")?;
            if settings.database.run_migrations {
                pool.migrate().await.context("Failed to run migrations")?;
            }
            let store: Arc<dyn TaskStore> = Arc::new(PostgresTaskStore::new(pool.clone()));
            (store, Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; tasks are lost on restart");
            let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
            (store, None)
        }
    };

    let executor: Arc<dyn TaskExecutor> = Arc::new(
        HttpTaskExecutor::new(&settings.executor, settings.scheduler.execution_timeout())
            .context("Failed to create HTTP executor")?,
    );

    let engine = Arc::new(SyncEngine::new(
        SyncConfig::from(&settings.scheduler),
        store.clone(),
        executor,
    ));

    let pruner_handle = if settings.retention.enabled {
        let pruner = RetentionPruner::new(settings.retention.clone(), store.clone());
        let shutdown_rx = engine.shutdown_receiver();
        Some(tokio::spawn(async move { pruner.run(shutdown_rx).await }))
    } else {
        None
    };

    let engine_for_shutdown = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        if let Err(e) = engine_for_shutdown.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    engine.start().await.context("Sync engine failed")?;

    if let Some(handle) = pruner_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Retention pruner task ended abnormally");
        }
    }
    if let Some(pool) = db_pool {
        pool.close().await;
    }
    telemetry::shutdown_tracer();

    info!("Scheduler stopped");
    Ok(())
}
