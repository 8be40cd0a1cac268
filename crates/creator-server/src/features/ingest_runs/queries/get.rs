//! Get ingest run query

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest_runs::{IngestDispatcher, IngestRun, IngestRunEvent, StoreError, VersionRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIngestRunQuery {
    pub id: Uuid,
}

/// A run with its versions and audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunDetail {
    #[serde(flatten)]
    pub run: IngestRun,
    pub versions: Vec<VersionRef>,
    pub events: Vec<IngestRunEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetIngestRunError {
    #[error("Ingest run {0} not found")]
    NotFound(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[tracing::instrument(skip(dispatcher), fields(ingest_run_id = %query.id))]
pub async fn handle(
    dispatcher: Arc<IngestDispatcher>,
    query: GetIngestRunQuery,
) -> Result<IngestRunDetail, GetIngestRunError> {
    let store = dispatcher.store();

    let run = store
        .get(query.id)
        .await?
        .ok_or(GetIngestRunError::NotFound(query.id))?;
    let versions = store.versions(run.id).await?;
    let events = store.events(run.id).await?;

    Ok(IngestRunDetail {
        run,
        versions,
        events,
    })
}
