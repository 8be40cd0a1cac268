//! Ingest run API routes
//!
//! # Route Structure
//!
//! - `POST /api/v1/ingest-runs` - Start an ingest run over a set of versions
//! - `GET /api/v1/ingest-runs` - List ingest runs, newest first
//! - `GET /api/v1/ingest-runs/:id` - Get a run with its versions and events
//! - `POST /api/v1/ingest-runs/:id/cancel` - Request cancellation of a run

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::ingest_runs::{IngestDispatcher, IngestRunError};
use crate::middleware::USER_ID_HEADER;

use super::{
    commands::{
        CancelIngestRunCommand, CancelIngestRunError, StartIngestRunCommand, StartIngestRunError,
    },
    queries::{GetIngestRunError, GetIngestRunQuery, ListIngestRunsError, ListIngestRunsQuery},
};

// ============================================================================
// Router Configuration
// ============================================================================

pub fn ingest_runs_routes() -> Router<Arc<IngestDispatcher>> {
    Router::new()
        .route("/", post(start_ingest_run).get(list_ingest_runs))
        .route("/:id", get(get_ingest_run))
        .route("/:id/cancel", post(cancel_ingest_run))
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Start a new ingest run
///
/// # Endpoint
///
/// `POST /api/v1/ingest-runs`
///
/// # Request Body
///
/// ```json
/// { "versions": ["FV_4DP2P2Y2", "FV_9ZC2DFV3"] }
/// ```
///
/// # Response
///
/// - `201 Created` - Run created in `waiting` and queued
/// - `400 Bad Request` - No versions, or an unknown version
/// - `500 Internal Server Error` - Store or queue failure
#[tracing::instrument(skip(dispatcher, headers, command), fields(count = command.versions.len()))]
async fn start_ingest_run(
    State(dispatcher): State<Arc<IngestDispatcher>>,
    headers: HeaderMap,
    Json(command): Json<StartIngestRunCommand>,
) -> Result<Response, IngestRunApiError> {
    let command = StartIngestRunCommand {
        creator_id: user_id(&headers),
        ..command
    };

    let run = super::commands::start::handle(dispatcher, command).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(run))).into_response())
}

/// Request cancellation of an ingest run
///
/// # Endpoint
///
/// `POST /api/v1/ingest-runs/:id/cancel`
///
/// # Response
///
/// - `202 Accepted` - Cancel task queued; body holds the run as it was
/// - `404 Not Found` - No such run
#[tracing::instrument(skip(dispatcher, headers), fields(ingest_run_id = %id))]
async fn cancel_ingest_run(
    State(dispatcher): State<Arc<IngestDispatcher>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, IngestRunApiError> {
    let command = CancelIngestRunCommand {
        id,
        requested_by: user_id(&headers),
    };
    let run = super::commands::cancel::handle(dispatcher, command).await?;

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(run))).into_response())
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

/// `GET /api/v1/ingest-runs/:id`
#[tracing::instrument(skip(dispatcher), fields(ingest_run_id = %id))]
async fn get_ingest_run(
    State(dispatcher): State<Arc<IngestDispatcher>>,
    Path(id): Path<Uuid>,
) -> Result<Response, IngestRunApiError> {
    let detail = super::queries::get::handle(dispatcher, GetIngestRunQuery { id }).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(detail))).into_response())
}

/// `GET /api/v1/ingest-runs?state=running&limit=20&offset=0`
#[tracing::instrument(skip(dispatcher, query), fields(state = ?query.state))]
async fn list_ingest_runs(
    State(dispatcher): State<Arc<IngestDispatcher>>,
    Query(query): Query<ListIngestRunsQuery>,
) -> Result<Response, IngestRunApiError> {
    let response = super::queries::list::handle(dispatcher, query).await?;

    let meta = json!({
        "limit": response.limit,
        "offset": response.offset,
        "count": response.items.len(),
    });

    Ok(
        (StatusCode::OK, Json(ApiResponse::success_with_meta(response.items, meta)))
            .into_response(),
    )
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum IngestRunApiError {
    Start(StartIngestRunError),
    Cancel(CancelIngestRunError),
    Get(GetIngestRunError),
    List(ListIngestRunsError),
}

impl From<StartIngestRunError> for IngestRunApiError {
    fn from(err: StartIngestRunError) -> Self {
        Self::Start(err)
    }
}

impl From<CancelIngestRunError> for IngestRunApiError {
    fn from(err: CancelIngestRunError) -> Self {
        Self::Cancel(err)
    }
}

impl From<GetIngestRunError> for IngestRunApiError {
    fn from(err: GetIngestRunError) -> Self {
        Self::Get(err)
    }
}

impl From<ListIngestRunsError> for IngestRunApiError {
    fn from(err: ListIngestRunsError) -> Self {
        Self::List(err)
    }
}

impl std::fmt::Display for IngestRunApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start(e) => write!(f, "{}", e),
            Self::Cancel(e) => write!(f, "{}", e),
            Self::Get(e) => write!(f, "{}", e),
            Self::List(e) => write!(f, "{}", e),
        }
    }
}

impl IntoResponse for IngestRunApiError {
    fn into_response(self) -> Response {
        match self {
            IngestRunApiError::Start(StartIngestRunError::NoVersions)
            | IngestRunApiError::Start(StartIngestRunError::UnknownVersion(_))
            | IngestRunApiError::List(ListIngestRunsError::InvalidLimit)
            | IngestRunApiError::List(ListIngestRunsError::InvalidOffset) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            IngestRunApiError::Cancel(CancelIngestRunError::NotFound(_))
            | IngestRunApiError::Cancel(CancelIngestRunError::Dispatch(IngestRunError::NotFound(_)))
            | IngestRunApiError::Get(GetIngestRunError::NotFound(_)) => {
                let error = ErrorResponse::new("NOT_FOUND", self.to_string());
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            IngestRunApiError::Start(StartIngestRunError::Dispatch(_))
            | IngestRunApiError::Cancel(CancelIngestRunError::Dispatch(_))
            | IngestRunApiError::Get(GetIngestRunError::Store(_))
            | IngestRunApiError::List(ListIngestRunsError::Store(_)) => {
                tracing::error!("Ingest run request failed: {}", self);
                let error = ErrorResponse::new("INTERNAL_ERROR", "An internal error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}
