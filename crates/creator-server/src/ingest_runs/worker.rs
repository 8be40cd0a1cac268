//! Queue worker
//!
//! Runs an apalis monitor over the Postgres task storage and executes each
//! task through [`IngestDispatcher::execute`].

use std::sync::Arc;

use anyhow::Result;
use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use tokio::task::JoinHandle;
use tracing::info;

use super::dispatcher::{IngestDispatcher, IngestRunError};
use super::queue::IngestRunTask;

const WORKER_NAME: &str = "creator-ingest-worker";

pub struct IngestWorker {
    dispatcher: Arc<IngestDispatcher>,
    storage: PostgresStorage<IngestRunTask>,
    concurrency: usize,
}

impl IngestWorker {
    pub fn new(
        dispatcher: Arc<IngestDispatcher>,
        storage: PostgresStorage<IngestRunTask>,
        concurrency: usize,
    ) -> Self {
        Self {
            dispatcher,
            storage,
            concurrency,
        }
    }

    /// Spawn the monitor on the runtime
    pub fn start(self) -> Result<JoinHandle<()>> {
        info!(concurrency = self.concurrency, "Starting ingest worker");

        let Self {
            dispatcher,
            storage,
            concurrency,
        } = self;

        let handle = tokio::spawn(async move {
            if let Err(e) = Monitor::new()
                .register(move |_index| {
                    WorkerBuilder::new(WORKER_NAME)
                        .backend(storage.clone())
                        .data(dispatcher.clone())
                        .concurrency(concurrency)
                        .build(process_ingest_task)
                })
                .run()
                .await
            {
                tracing::error!("Ingest worker error: {:?}", e);
            }
            info!("Ingest worker stopped");
        });

        Ok(handle)
    }
}

/// Handler invoked by apalis for every dequeued task
///
/// The error is returned so apalis records the failed attempt.
async fn process_ingest_task(
    task: IngestRunTask,
    dispatcher: Data<Arc<IngestDispatcher>>,
) -> Result<(), IngestRunError> {
    info!(
        job = task.job_name(),
        ingest_run_id = %task.ingest_run_id(),
        "Processing queued task"
    );

    dispatcher.execute(task).await
}
