//! Ingest run dispatcher
//!
//! Creates runs, hands them to the task queue, and executes queued tasks:
//!
//! 1. `create_ingest_run` persists a `waiting` run together with its versions
//!    and fingerprint before anything is enqueued.
//! 2. `run` refuses a run that cannot start, cancels running duplicates,
//!    starts the run, invokes the pipeline and finishes in `complete` or
//!    `failed`.
//! 3. `cancel` moves a non-terminal run to `canceled`; terminal runs are left
//!    untouched.
//!
//! Errors from `run` and `cancel` always propagate so the queue records the
//! failure. A failed pipeline still marks the run `failed` first.

use std::sync::Arc;

use creator_common::InputFingerprint;
use uuid::Uuid;

use super::guard::DeduplicationGuard;
use super::jobs::{JobJournal, JobRecorder, JournalError};
use super::models::{display_name, IngestRun};
use super::pipeline::{IngestPipeline, PipelineError};
use super::queue::{IngestRunTask, QueueError, TaskQueue};
use super::state::{IllegalTransition, IngestRunState, StateEvent};
use super::store::{IngestRunStore, NewIngestRun, StoreError};

/// Settings injected at construction
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Cancel running duplicates before a run starts
    pub cancel_duplicates: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cancel_duplicates: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestRunError {
    #[error("Ingest run {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("An ingest run needs at least one file version")]
    NoVersions,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Ingest failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Job journal error: {0}")]
    Journal(#[from] JournalError),
}

impl From<StoreError> for IngestRunError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => IngestRunError::NotFound(id),
            StoreError::IllegalTransition(t) => IngestRunError::IllegalTransition(t),
            other => IngestRunError::Store(other),
        }
    }
}

pub struct IngestDispatcher {
    store: Arc<dyn IngestRunStore>,
    queue: Arc<dyn TaskQueue>,
    pipeline: Arc<dyn IngestPipeline>,
    journal: Arc<dyn JobJournal>,
    guard: DeduplicationGuard,
    config: DispatcherConfig,
}

impl IngestDispatcher {
    pub fn new(
        store: Arc<dyn IngestRunStore>,
        queue: Arc<dyn TaskQueue>,
        pipeline: Arc<dyn IngestPipeline>,
        journal: Arc<dyn JobJournal>,
        config: DispatcherConfig,
    ) -> Self {
        let guard = DeduplicationGuard::new(store.clone(), queue.clone());
        Self {
            store,
            queue,
            pipeline,
            journal,
            guard,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn IngestRunStore> {
        &self.store
    }

    /// Create a `waiting` run over `version_ids`; the versions, fingerprint
    /// and `IR_INI` event are written in one store call
    ///
    /// Nothing is enqueued; call [`enqueue_run`](Self::enqueue_run) next.
    #[tracing::instrument(skip(self, version_ids), fields(count = version_ids.len()))]
    pub async fn create_ingest_run(
        &self,
        version_ids: &[String],
        creator_id: Option<String>,
    ) -> Result<IngestRun, IngestRunError> {
        if version_ids.is_empty() {
            return Err(IngestRunError::NoVersions);
        }

        let new_run = NewIngestRun::new(version_ids, creator_id);
        let run = self.store.create(&new_run).await?;

        tracing::info!(
            ingest_run_id = %run.id,
            fingerprint = ?run.input_fingerprint.as_ref().map(InputFingerprint::as_str),
            "Ingest run created"
        );

        Ok(run)
    }

    /// Recompute the fingerprint and display name from the attached versions
    pub async fn compute_and_store_fingerprint(&self, id: Uuid) -> Result<IngestRun, IngestRunError> {
        let versions = self.store.versions(id).await?;
        let ids: Vec<&str> = versions.iter().map(|v| v.kf_id.as_str()).collect();

        let fingerprint = InputFingerprint::from_versions(&ids);
        let name = display_name(&ids);

        Ok(self.store.store_fingerprint(id, &fingerprint, &name).await?)
    }

    pub async fn enqueue_run(&self, id: Uuid) -> Result<(), IngestRunError> {
        Ok(self.queue.enqueue(IngestRunTask::Run { ingest_run_id: id }).await?)
    }

    /// Queue a cancel on behalf of `requested_by`
    pub async fn enqueue_cancel(
        &self,
        id: Uuid,
        requested_by: Option<String>,
    ) -> Result<(), IngestRunError> {
        Ok(self
            .queue
            .enqueue(IngestRunTask::Cancel {
                ingest_run_id: id,
                requested_by,
            })
            .await?)
    }

    /// Drive a `waiting` run to a terminal state
    #[tracing::instrument(skip(self), fields(ingest_run_id = %id))]
    pub async fn run(&self, id: Uuid) -> Result<IngestRun, IngestRunError> {
        let mut run = self
            .store
            .get(id)
            .await?
            .ok_or(IngestRunError::NotFound(id))?;
        tracing::info!("Preparing ingest run for processing");

        // Duplicates are only canceled on behalf of a run that will start
        if let Err(e) = run.state.apply(StateEvent::Start) {
            tracing::warn!(state = %run.state, "Ingest run cannot start");
            return Err(e.into());
        }

        if run.input_fingerprint.is_none() {
            tracing::warn!("Ingest run has no fingerprint, computing it before start");
            run = self.compute_and_store_fingerprint(id).await?;
        }

        if self.config.cancel_duplicates {
            if let Some(fingerprint) = run.input_fingerprint.as_ref() {
                if let Err(e) = self.guard.cancel_duplicates(id, fingerprint).await {
                    tracing::warn!(error = %e, "Duplicate scan failed, continuing");
                }
            }
        }

        self.store.transition(id, StateEvent::Start, None).await?;

        let outcome = match self.store.versions(id).await {
            Ok(versions) => self.pipeline.ingest(id, &versions).await.map_err(IngestRunError::from),
            Err(e) => Err(e.into()),
        };

        if let Err(err) = outcome {
            tracing::info!(error = %err, "The ingest run failed");
            if let Err(mark) = self.store.transition(id, StateEvent::Fail, None).await {
                tracing::error!(error = %mark, "Could not mark ingest run failed");
            }
            return Err(err);
        }

        let finished = match self.store.transition(id, StateEvent::Complete, None).await {
            Ok(finished) => finished,
            Err(StoreError::IllegalTransition(e)) if e.from == IngestRunState::Canceled => {
                tracing::info!("Ingest run was canceled while running");
                return Err(e.into());
            },
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Finished processing ingest run");

        Ok(finished.run)
    }

    /// Move a run to `canceled`; a terminal run is left as it is
    ///
    /// `requested_by` is recorded on the `IR_CAN` event.
    #[tracing::instrument(skip(self), fields(ingest_run_id = %id))]
    pub async fn cancel(
        &self,
        id: Uuid,
        requested_by: Option<&str>,
    ) -> Result<IngestRun, IngestRunError> {
        if self.store.get(id).await?.is_none() {
            tracing::error!("Cannot cancel missing ingest run");
            return Err(IngestRunError::NotFound(id));
        }

        let outcome = self.store.transition(id, StateEvent::Cancel, requested_by).await?;
        if outcome.changed {
            tracing::info!("Ingest run canceled");
        } else {
            tracing::info!(state = %outcome.run.state, "Ingest run already finished, nothing to cancel");
        }

        Ok(outcome.run)
    }

    /// Execute a queued task inside its job journal
    ///
    /// Inactive jobs are skipped. The task's error is recorded and then
    /// returned unchanged.
    #[tracing::instrument(skip(self), fields(job = task.job_name(), ingest_run_id = %task.ingest_run_id()))]
    pub async fn execute(&self, task: IngestRunTask) -> Result<(), IngestRunError> {
        let job_name = task.job_name();
        let job = self.journal.get_or_register(job_name).await?;
        if !job.active {
            tracing::info!("The {} job is not active, will not run", job_name);
            return Ok(());
        }

        let mut recorder = JobRecorder::start(job_name);
        recorder.line(format!("Processing ingest run {}", task.ingest_run_id()));

        let result = match &task {
            IngestRunTask::Run { ingest_run_id } => self.run(*ingest_run_id).await.map(drop),
            IngestRunTask::Cancel {
                ingest_run_id,
                requested_by,
            } => self
                .cancel(*ingest_run_id, requested_by.as_deref())
                .await
                .map(drop),
        };

        let error = result.as_ref().err().map(ToString::to_string);
        let log = recorder.finish(error.as_deref());
        if let Err(e) = self.journal.record(job_name, &log, error.as_deref()).await {
            tracing::error!(error = %e, "Failed to save job log");
        } else if let IngestRunTask::Run { ingest_run_id } = task {
            if let Err(e) = self.store.attach_job_log(ingest_run_id, log.id).await {
                tracing::warn!(error = %e, "Failed to attach job log to ingest run");
            }
        }

        result
    }
}
