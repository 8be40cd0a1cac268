//! Persistence port for ingest runs
//!
//! [`IngestRunStore`] is the only way the orchestration core touches durable
//! state. Two operations must be atomic:
//!
//! - `create` writes the run, its version set, fingerprint and `IR_INI` event
//!   together, or nothing when a version is unknown.
//! - `transition` is the load-apply-persist step of the state machine; the
//!   state, its lifecycle markers and the audit event land together.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use creator_common::InputFingerprint;
use uuid::Uuid;

use super::models::{display_name, EventType, IngestRun, IngestRunEvent, VersionRef};
use super::state::{IllegalTransition, IngestRunState, StateEvent};

/// Errors raised by a store implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("File version '{0}' does not exist")]
    UnknownVersion(String),

    #[error("Ingest run {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("Corrupt ingest run record: {0}")]
    Corrupt(String),
}

/// Result of a persisted transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub run: IngestRun,
    /// False when the event was accepted as a no-op
    pub changed: bool,
}

/// A run ready to be inserted, fingerprint included
#[derive(Debug, Clone)]
pub struct NewIngestRun {
    pub creator_id: Option<String>,
    /// Sorted and de-duplicated
    pub version_ids: Vec<String>,
    pub fingerprint: InputFingerprint,
    pub name: String,
}

impl NewIngestRun {
    pub fn new(version_ids: &[String], creator_id: Option<String>) -> Self {
        let version_ids: Vec<String> = version_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            creator_id,
            fingerprint: InputFingerprint::from_versions(&version_ids),
            name: display_name(&version_ids),
            version_ids,
        }
    }

    pub(crate) fn into_run(self) -> (IngestRun, Vec<String>) {
        let mut run = IngestRun::new(self.creator_id);
        run.input_fingerprint = Some(self.fingerprint);
        run.name = self.name;
        (run, self.version_ids)
    }
}

/// Filter for listing runs, newest first
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<IngestRunState>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait IngestRunStore: Send + Sync {
    /// Insert a `waiting` run with its versions and record its `IR_INI` event
    ///
    /// Fails with [`StoreError::UnknownVersion`] and writes nothing when an id
    /// is absent from the version catalogue.
    async fn create(&self, new_run: &NewIngestRun) -> Result<IngestRun, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<IngestRun>, StoreError>;

    /// Versions attached to a run, ordered by id
    async fn versions(&self, id: Uuid) -> Result<Vec<VersionRef>, StoreError>;

    async fn store_fingerprint(
        &self,
        id: Uuid,
        fingerprint: &InputFingerprint,
        name: &str,
    ) -> Result<IngestRun, StoreError>;

    /// Atomically apply `event` to the stored state of run `id`
    async fn transition(
        &self,
        id: Uuid,
        event: StateEvent,
        user_id: Option<&str>,
    ) -> Result<Transition, StoreError>;

    /// Ids of `running` runs with `fingerprint`, other than `exclude`
    async fn find_running_duplicates(
        &self,
        fingerprint: &InputFingerprint,
        exclude: Uuid,
    ) -> Result<Vec<Uuid>, StoreError>;

    async fn attach_job_log(&self, id: Uuid, job_log_id: Uuid) -> Result<(), StoreError>;

    /// Audit events of a run in the order they were written
    async fn events(&self, id: Uuid) -> Result<Vec<IngestRunEvent>, StoreError>;

    async fn list(&self, filter: &ListFilter) -> Result<Vec<IngestRun>, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    catalogue: HashMap<String, VersionRef>,
    runs: HashMap<Uuid, IngestRun>,
    run_versions: HashMap<Uuid, BTreeSet<String>>,
    events: Vec<IngestRunEvent>,
}

/// Store backed by process memory
///
/// Every operation holds one lock for its whole duration, which gives
/// `transition` the same atomicity as the Postgres row lock.
#[derive(Default)]
pub struct MemoryIngestRunStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryIngestRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file version to the catalogue
    pub fn register_version(&self, version: VersionRef) {
        self.lock().catalogue.insert(version.kf_id.clone(), version);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IngestRunStore for MemoryIngestRunStore {
    async fn create(&self, new_run: &NewIngestRun) -> Result<IngestRun, StoreError> {
        let mut inner = self.lock();
        if let Some(missing) = new_run
            .version_ids
            .iter()
            .find(|v| !inner.catalogue.contains_key(*v))
        {
            return Err(StoreError::UnknownVersion(missing.clone()));
        }

        let (run, version_ids) = new_run.clone().into_run();
        let event = IngestRunEvent::new(run.id, EventType::Initialized, run.creator_id.clone());

        inner.runs.insert(run.id, run.clone());
        inner.run_versions.insert(run.id, version_ids.into_iter().collect());
        inner.events.push(event);

        Ok(run)
    }

    async fn get(&self, id: Uuid) -> Result<Option<IngestRun>, StoreError> {
        Ok(self.lock().runs.get(&id).cloned())
    }

    async fn versions(&self, id: Uuid) -> Result<Vec<VersionRef>, StoreError> {
        let inner = self.lock();
        let ids = inner.run_versions.get(&id).ok_or(StoreError::NotFound(id))?;

        Ok(ids
            .iter()
            .filter_map(|kf_id| inner.catalogue.get(kf_id).cloned())
            .collect())
    }

    async fn store_fingerprint(
        &self,
        id: Uuid,
        fingerprint: &InputFingerprint,
        name: &str,
    ) -> Result<IngestRun, StoreError> {
        let mut inner = self.lock();
        let run = inner.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        run.input_fingerprint = Some(fingerprint.clone());
        run.name = name.to_string();
        Ok(run.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        event: StateEvent,
        user_id: Option<&str>,
    ) -> Result<Transition, StoreError> {
        let mut inner = self.lock();
        let run = inner.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let next = run.state.apply(event)?;
        if next == run.state {
            return Ok(Transition {
                run: run.clone(),
                changed: false,
            });
        }

        run.stamp(next, Utc::now());
        let run = run.clone();

        if let Some(event_type) = EventType::for_state(next) {
            inner
                .events
                .push(IngestRunEvent::new(id, event_type, user_id.map(str::to_string)));
        }

        Ok(Transition { run, changed: true })
    }

    async fn find_running_duplicates(
        &self,
        fingerprint: &InputFingerprint,
        exclude: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.lock();
        let mut duplicates: Vec<&IngestRun> = inner
            .runs
            .values()
            .filter(|run| {
                run.id != exclude
                    && run.state == IngestRunState::Running
                    && run.input_fingerprint.as_ref() == Some(fingerprint)
            })
            .collect();
        duplicates.sort_by_key(|run| run.created_at);

        Ok(duplicates.into_iter().map(|run| run.id).collect())
    }

    async fn attach_job_log(&self, id: Uuid, job_log_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let run = inner.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        run.job_log_id = Some(job_log_id);
        Ok(())
    }

    async fn events(&self, id: Uuid) -> Result<Vec<IngestRunEvent>, StoreError> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|event| event.ingest_run_id == id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<IngestRun>, StoreError> {
        let inner = self.lock();
        let mut runs: Vec<IngestRun> = inner
            .runs
            .values()
            .filter(|run| filter.state.map_or(true, |state| run.state == state))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }
}
