//! Ingest run orchestration
//!
//! The lifecycle of a data ingest request:
//!
//! - [`state`]: the explicit state machine
//! - [`models`]: runs, version references and audit events
//! - [`store`] / [`postgres`]: the persistence port and its implementations
//! - [`queue`]: the task submission port
//! - [`guard`]: cancellation of running duplicates
//! - [`pipeline`]: the ingest work itself
//! - [`jobs`]: job registry and execution logs
//! - [`dispatcher`]: creation, enqueueing and task execution
//! - [`worker`]: the apalis worker that feeds the dispatcher

pub mod dispatcher;
pub mod guard;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod postgres;
pub mod queue;
pub mod state;
pub mod store;
pub mod worker;

pub use dispatcher::{DispatcherConfig, IngestDispatcher, IngestRunError};
pub use guard::DeduplicationGuard;
pub use jobs::{JobJournal, JobLog, MemoryJobJournal, PgJobJournal, TaskJob};
pub use models::{EventType, IngestRun, IngestRunEvent, VersionRef, FILE_TYPE_GWO};
pub use pipeline::{GenomicWorkflowPipeline, IngestPipeline, PipelineError};
pub use postgres::PgIngestRunStore;
pub use queue::{ApalisTaskQueue, IngestRunTask, MemoryTaskQueue, QueueError, TaskQueue};
pub use state::{IllegalTransition, IngestRunState, StateEvent};
pub use store::{
    IngestRunStore, ListFilter, MemoryIngestRunStore, NewIngestRun, StoreError, Transition,
};
pub use worker::IngestWorker;
