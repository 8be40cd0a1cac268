//! Study Creator Server Library
//!
//! Orchestrates ingest runs: requests to load a set of versioned input files
//! into the study data store.
//!
//! # Overview
//!
//! - **Ingest runs**: an explicit state machine (`waiting → running →
//!   complete | failed | canceled`) persisted atomically with lifecycle
//!   markers and an audit trail
//! - **Deduplication**: runs are fingerprinted by their input set; a starting
//!   run cancels any running duplicate through the task queue
//! - **Task queue**: `run` and `cancel` tasks are executed by an apalis worker
//!   backed by PostgreSQL
//! - **HTTP API**: Axum routes for starting, canceling and inspecting runs
//!
//! # Architecture
//!
//! The orchestration core in [`ingest_runs`] talks to the outside world only
//! through ports: [`ingest_runs::IngestRunStore`], [`ingest_runs::TaskQueue`],
//! [`ingest_runs::IngestPipeline`] and [`ingest_runs::JobJournal`]. Each has a
//! Postgres (or apalis) implementation for production and an in-memory one
//! for tests.
//!
//! HTTP features follow a command/query split:
//!
//! - **Commands** (`POST`): start and cancel ingest runs
//! - **Queries** (`GET`): fetch one run or list runs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use creator_server::ingest_runs::{
//!     DispatcherConfig, GenomicWorkflowPipeline, IngestDispatcher, MemoryIngestRunStore,
//!     MemoryJobJournal, MemoryTaskQueue,
//! };
//!
//! let dispatcher = IngestDispatcher::new(
//!     Arc::new(MemoryIngestRunStore::new()),
//!     Arc::new(MemoryTaskQueue::new()),
//!     Arc::new(GenomicWorkflowPipeline::new(true)),
//!     Arc::new(MemoryJobJournal::new()),
//!     DispatcherConfig::default(),
//! );
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest_runs;
pub mod middleware;

pub use error::AppError;
