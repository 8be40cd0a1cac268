//! Common test utilities for Study Creator integration tests
//!
//! - [`Harness`] wires an [`IngestDispatcher`] to the in-memory store, queue
//!   and journal so lifecycle tests run without a database.
//! - [`TestPostgres`] starts a PostgreSQL container with migrations applied.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::Harness;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = Harness::new();
//!     harness.register_gwo("FV_1");
//!     let run = harness.dispatcher.create_ingest_run(&["FV_1".into()], None).await.unwrap();
//!     harness.drain().await;
//! }
//! ```

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

use creator_server::ingest_runs::{
    DispatcherConfig, GenomicWorkflowPipeline, IngestDispatcher, IngestPipeline, IngestRunError,
    IngestRunTask, MemoryIngestRunStore, MemoryJobJournal, MemoryTaskQueue, QueueError, TaskQueue,
    VersionRef, FILE_TYPE_GWO,
};

// ============================================================================
// In-memory harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryIngestRunStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub journal: Arc<MemoryJobJournal>,
    pub dispatcher: Arc<IngestDispatcher>,
}

impl Harness {
    /// Dispatcher with the genomic workflow pipeline enabled
    pub fn new() -> Self {
        Self::with_pipeline(Arc::new(GenomicWorkflowPipeline::new(true)))
    }

    pub fn with_pipeline(pipeline: Arc<dyn IngestPipeline>) -> Self {
        Self::with_config(pipeline, DispatcherConfig::default())
    }

    pub fn with_config(pipeline: Arc<dyn IngestPipeline>, config: DispatcherConfig) -> Self {
        Self::build(pipeline, config, |queue| queue as Arc<dyn TaskQueue>)
    }

    /// Dispatcher whose queue refuses every `cancel` task
    ///
    /// `run` tasks still reach [`Harness::queue`].
    pub fn with_rejected_cancels() -> Self {
        Self::build(
            Arc::new(GenomicWorkflowPipeline::new(true)),
            DispatcherConfig::default(),
            |queue| {
                let rejecting: Arc<dyn TaskQueue> = Arc::new(CancelRejectingQueue { inner: queue });
                rejecting
            },
        )
    }

    fn build(
        pipeline: Arc<dyn IngestPipeline>,
        config: DispatcherConfig,
        wrap_queue: impl FnOnce(Arc<MemoryTaskQueue>) -> Arc<dyn TaskQueue>,
    ) -> Self {
        let store = Arc::new(MemoryIngestRunStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let journal = Arc::new(MemoryJobJournal::new());
        let dispatcher = Arc::new(IngestDispatcher::new(
            store.clone(),
            wrap_queue(queue.clone()),
            pipeline,
            journal.clone(),
            config,
        ));

        Self {
            store,
            queue,
            journal,
            dispatcher,
        }
    }

    pub fn register_gwo(&self, kf_id: &str) {
        self.store.register_version(VersionRef::new(
            kf_id,
            format!("{}.manifest.tsv", kf_id.to_lowercase()),
            FILE_TYPE_GWO,
        ));
    }

    pub fn register_version(&self, kf_id: &str, file_type: &str) {
        self.store
            .register_version(VersionRef::new(kf_id, format!("{}.dat", kf_id), file_type));
    }

    /// Execute queued tasks until the queue is empty, in submission order
    pub async fn drain(&self) -> Vec<(IngestRunTask, Result<(), IngestRunError>)> {
        let mut outcomes = Vec::new();
        loop {
            let batch = self.queue.drain();
            if batch.is_empty() {
                return outcomes;
            }
            for task in batch {
                let result = self.dispatcher.execute(task.clone()).await;
                outcomes.push((task, result));
            }
        }
    }
}

/// Queue that fails every `cancel` submission, as when the broker is down
struct CancelRejectingQueue {
    inner: Arc<MemoryTaskQueue>,
}

#[async_trait]
impl TaskQueue for CancelRejectingQueue {
    async fn enqueue(&self, task: IngestRunTask) -> Result<(), QueueError> {
        match task {
            IngestRunTask::Cancel { ingest_run_id, .. } => Err(QueueError::Submit {
                job: task.job_name(),
                ingest_run_id,
                reason: "broker unavailable".to_string(),
            }),
            task => self.inner.enqueue(task).await,
        }
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with migrations pre-applied
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { container, pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a row into the version catalogue
    pub async fn insert_version(&self, kf_id: &str, file_type: &str) -> Result<()> {
        sqlx::query("INSERT INTO file_versions (kf_id, file_name, file_type) VALUES ($1, $2, $3)")
            .bind(kf_id)
            .bind(format!("{}.manifest.tsv", kf_id.to_lowercase()))
            .bind(file_type)
            .execute(&self.pool)
            .await
            .context("Failed to insert file version")?;
        Ok(())
    }
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,creator_server=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
