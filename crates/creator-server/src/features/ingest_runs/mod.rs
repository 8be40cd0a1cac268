pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    CancelIngestRunCommand, CancelIngestRunError, StartIngestRunCommand, StartIngestRunError,
};

pub use queries::{
    GetIngestRunError, GetIngestRunQuery, IngestRunDetail, ListIngestRunsError,
    ListIngestRunsQuery, ListIngestRunsResponse,
};

pub use routes::ingest_runs_routes;
