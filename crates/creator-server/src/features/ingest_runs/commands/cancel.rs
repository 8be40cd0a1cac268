//! Cancel ingest run command

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest_runs::{IngestDispatcher, IngestRun, IngestRunError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelIngestRunCommand {
    pub id: Uuid,

    /// Set from the request headers, never from the body
    #[serde(skip)]
    pub requested_by: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CancelIngestRunError {
    #[error("Ingest run {0} not found")]
    NotFound(Uuid),

    #[error("Failed to cancel ingest run: {0}")]
    Dispatch(#[from] IngestRunError),
}

/// Enqueue a cancel task for an existing run
///
/// Returns the run as it was when the cancel was queued.
#[tracing::instrument(skip(dispatcher), fields(ingest_run_id = %command.id))]
pub async fn handle(
    dispatcher: Arc<IngestDispatcher>,
    command: CancelIngestRunCommand,
) -> Result<IngestRun, CancelIngestRunError> {
    let run = dispatcher
        .store()
        .get(command.id)
        .await
        .map_err(IngestRunError::from)?
        .ok_or(CancelIngestRunError::NotFound(command.id))?;

    dispatcher.enqueue_cancel(run.id, command.requested_by).await?;
    tracing::info!(state = %run.state, "Ingest run cancel queued");

    Ok(run)
}
