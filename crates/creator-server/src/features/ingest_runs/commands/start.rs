//! Start ingest run command
//!
//! Creates a `waiting` run over a set of file versions, stores its
//! fingerprint, and enqueues the `run` task.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ingest_runs::{IngestDispatcher, IngestRun, IngestRunError, StoreError};

/// Command to start a new ingest run
///
/// ```rust,ignore
/// let command = StartIngestRunCommand {
///     versions: vec!["FV_4DP2P2Y2".to_string(), "FV_9ZC2DFV3".to_string()],
///     creator_id: Some("user-1".to_string()),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartIngestRunCommand {
    /// File version ids to ingest
    pub versions: Vec<String>,

    /// Set from the request headers, never from the body
    #[serde(skip)]
    pub creator_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartIngestRunError {
    #[error("At least one file version is required")]
    NoVersions,

    #[error("File version '{0}' does not exist")]
    UnknownVersion(String),

    #[error("Failed to start ingest run: {0}")]
    Dispatch(IngestRunError),
}

impl From<IngestRunError> for StartIngestRunError {
    fn from(err: IngestRunError) -> Self {
        match err {
            IngestRunError::NoVersions => Self::NoVersions,
            IngestRunError::Store(StoreError::UnknownVersion(id)) => Self::UnknownVersion(id),
            other => Self::Dispatch(other),
        }
    }
}

impl StartIngestRunCommand {
    /// Trimmed, de-duplicated version ids in submission order
    fn version_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.versions.len());
        for id in self.versions.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }
}

#[tracing::instrument(
    skip(dispatcher, command),
    fields(count = command.versions.len(), creator = ?command.creator_id)
)]
pub async fn handle(
    dispatcher: Arc<IngestDispatcher>,
    command: StartIngestRunCommand,
) -> Result<IngestRun, StartIngestRunError> {
    let version_ids = command.version_ids();

    let run = dispatcher
        .create_ingest_run(&version_ids, command.creator_id)
        .await?;
    dispatcher.enqueue_run(run.id).await?;

    tracing::info!(ingest_run_id = %run.id, name = %run.name, "Ingest run queued");

    Ok(run)
}
