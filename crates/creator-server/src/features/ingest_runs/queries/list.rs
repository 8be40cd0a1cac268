use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ingest_runs::{IngestDispatcher, IngestRun, IngestRunState, ListFilter, StoreError};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListIngestRunsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IngestRunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIngestRunsResponse {
    pub items: Vec<IngestRun>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ListIngestRunsError {
    #[error("Limit must be between 1 and 100")]
    InvalidLimit,
    #[error("Offset cannot be negative")]
    InvalidOffset,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ListIngestRunsQuery {
    pub fn validate(&self) -> Result<(), ListIngestRunsError> {
        if let Some(limit) = self.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(ListIngestRunsError::InvalidLimit);
            }
        }
        if self.offset.is_some_and(|offset| offset < 0) {
            return Err(ListIngestRunsError::InvalidOffset);
        }
        Ok(())
    }

    fn filter(&self) -> ListFilter {
        ListFilter {
            state: self.state,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            offset: self.offset.unwrap_or(0),
        }
    }
}

#[tracing::instrument(skip(dispatcher))]
pub async fn handle(
    dispatcher: Arc<IngestDispatcher>,
    query: ListIngestRunsQuery,
) -> Result<ListIngestRunsResponse, ListIngestRunsError> {
    query.validate()?;

    let filter = query.filter();
    let items = dispatcher.store().list(&filter).await?;

    Ok(ListIngestRunsResponse {
        items,
        limit: filter.limit,
        offset: filter.offset,
    })
}
