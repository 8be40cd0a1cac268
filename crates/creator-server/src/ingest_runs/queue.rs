//! Task submission boundary
//!
//! The orchestration core hands work to an asynchronous queue through the
//! narrow [`TaskQueue`] port. Production uses apalis over Postgres; tests use
//! [`MemoryTaskQueue`] and execute the drained tasks directly.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job name of `run` tasks in the job registry
pub const RUN_INGEST_JOB: &str = "run_ingest";

/// Job name of `cancel` tasks in the job registry
pub const CANCEL_INGEST_JOB: &str = "cancel_ingest";

/// Work item carried by the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum IngestRunTask {
    Run {
        ingest_run_id: Uuid,
    },
    Cancel {
        ingest_run_id: Uuid,
        /// User behind the cancel; `None` when the duplicate guard asked
        #[serde(default)]
        requested_by: Option<String>,
    },
}

impl IngestRunTask {
    pub fn ingest_run_id(&self) -> Uuid {
        match self {
            IngestRunTask::Run { ingest_run_id } | IngestRunTask::Cancel { ingest_run_id, .. } => {
                *ingest_run_id
            },
        }
    }

    pub fn job_name(&self) -> &'static str {
        match self {
            IngestRunTask::Run { .. } => RUN_INGEST_JOB,
            IngestRunTask::Cancel { .. } => CANCEL_INGEST_JOB,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Failed to enqueue {job} for ingest run {ingest_run_id}: {reason}")]
    Submit {
        job: &'static str,
        ingest_run_id: Uuid,
        reason: String,
    },
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: IngestRunTask) -> Result<(), QueueError>;
}

/// Queue backed by apalis Postgres storage
#[derive(Clone)]
pub struct ApalisTaskQueue {
    storage: PostgresStorage<IngestRunTask>,
}

impl ApalisTaskQueue {
    pub fn new(storage: PostgresStorage<IngestRunTask>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl TaskQueue for ApalisTaskQueue {
    #[tracing::instrument(skip(self), fields(job = task.job_name(), ingest_run_id = %task.ingest_run_id()))]
    async fn enqueue(&self, task: IngestRunTask) -> Result<(), QueueError> {
        let job = task.job_name();
        let ingest_run_id = task.ingest_run_id();

        let mut storage = self.storage.clone();
        storage.push(task).await.map_err(|e| QueueError::Submit {
            job,
            ingest_run_id,
            reason: e.to_string(),
        })?;

        tracing::debug!("Task enqueued");
        Ok(())
    }
}

/// FIFO queue held in memory
#[derive(Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<VecDeque<IngestRunTask>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending task in submission order
    pub fn drain(&self) -> Vec<IngestRunTask> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: IngestRunTask) -> Result<(), QueueError> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
        Ok(())
    }
}
