//! Feature modules implementing the Study Creator API
//!
//! Each feature is a vertical slice with its own commands (writes), queries
//! (reads), and routes.
//!
//! # Features
//!
//! - **ingest_runs**: request, cancel and inspect ingest runs

pub mod ingest_runs;

use std::sync::Arc;

use axum::Router;

use crate::ingest_runs::IngestDispatcher;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub dispatcher: Arc<IngestDispatcher>,
}

/// Creates the API router with all feature routes mounted
///
/// - `/ingest-runs` - Ingest run orchestration
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest(
        "/ingest-runs",
        ingest_runs::ingest_runs_routes().with_state(state.dispatcher),
    )
}
