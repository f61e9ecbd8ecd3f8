// Scheduler binary entry point

use anyhow::{Context, Result};
use common::config::Settings;
use common::db::repositories::{ExecutionRepository, JobRepository};
use common::db::DbPool;
use common::executor::ExecutorRegistry;
use common::scheduler::{Scheduler, SchedulerConfig, SchedulerEngine};
use common::store::{ExecutionStore, JobStore};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.log_format,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    info!(
        max_concurrent_jobs = settings.scheduler.max_concurrent_jobs,
        timezone = %settings.scheduler.timezone,
        "Starting job scheduler"
    );

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let result = run(settings).await;
    if let Err(e) = &result {
        error!(error = %e, "Scheduler exited with error");
    }

    telemetry::shutdown_tracer();
    result
}

async fn run(settings: Settings) -> Result<()> {
    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;
    db_pool
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;
    info!("Database connection pool initialized");

    let jobs: Arc<dyn JobStore> = Arc::new(JobRepository::new(db_pool.clone()));
    let executions: Arc<dyn ExecutionStore> = Arc::new(ExecutionRepository::new(db_pool.clone()));
    let registry = ExecutorRegistry::with_defaults(&settings)
        .context("Failed to build job executor registry")?;
    info!(job_types = ?registry.job_types(), "Job executors registered");

    let config = SchedulerConfig::from_settings(&settings.scheduler)?;
    let scheduler = SchedulerEngine::new(config, jobs, executions, registry);

    if settings.scheduler.enabled {
        scheduler.start().await?;
    } else {
        warn!("Scheduler is disabled by configuration; no jobs will fire");
    }

    shutdown_signal().await;
    info!("Received shutdown signal, initiating graceful shutdown");

    scheduler.stop().await;
    db_pool.close().await;

    info!("Scheduler stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
