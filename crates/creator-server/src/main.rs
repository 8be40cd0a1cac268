//! Study Creator Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use apalis_postgres::PostgresStorage;
use creator_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tracing::info;

use creator_server::{
    api::{self, AppState},
    config::Config,
    db,
    ingest_runs::{
        ApalisTaskQueue, GenomicWorkflowPipeline, IngestDispatcher, IngestRunTask, IngestWorker,
        PgIngestRunStore, PgJobJournal,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("creator-server")
        .filter_directives("creator_server=debug,tower_http=debug,sqlx=warn,apalis=info")
        .build()
        .merge_env()
        .context("Invalid logging configuration")?;

    init_logging(&log_config)?;

    info!("Starting Study Creator server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&db_pool)
        .await
        .context("Failed to run migrations")?;

    PostgresStorage::setup(&db_pool)
        .await
        .context("Failed to set up task queue storage")?;
    let task_storage: PostgresStorage<IngestRunTask> = PostgresStorage::new(&db_pool);

    let dispatcher = Arc::new(IngestDispatcher::new(
        Arc::new(PgIngestRunStore::new(db_pool.clone())),
        Arc::new(ApalisTaskQueue::new(task_storage.clone())),
        Arc::new(GenomicWorkflowPipeline::new(config.ingest.genomic_workflow_outputs)),
        Arc::new(PgJobJournal::new(db_pool.clone())),
        config.ingest.dispatcher(),
    ));

    let _worker_handle = if config.ingest.worker_enabled {
        let worker = IngestWorker::new(
            dispatcher.clone(),
            task_storage,
            config.ingest.worker_concurrency,
        );
        Some(worker.start()?)
    } else {
        info!("Ingest worker is disabled (INGEST_WORKER_ENABLED=false)");
        None
    };

    let state = AppState {
        db: db_pool,
        dispatcher,
    };
    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
