pub mod cancel;
pub mod start;

pub use cancel::{CancelIngestRunCommand, CancelIngestRunError};
pub use start::{StartIngestRunCommand, StartIngestRunError};
