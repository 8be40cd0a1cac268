pub mod get;
pub mod list;

pub use get::{GetIngestRunError, GetIngestRunQuery, IngestRunDetail};
pub use list::{ListIngestRunsError, ListIngestRunsQuery, ListIngestRunsResponse};
