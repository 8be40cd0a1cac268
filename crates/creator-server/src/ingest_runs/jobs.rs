//! Job registry and per-execution job logs
//!
//! Each queued task belongs to a named job (`run_ingest`, `cancel_ingest`).
//! The registry tracks whether a job is active and how its last execution
//! went; every execution also leaves a [`JobLog`] behind.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const SERVICE_NAME: &str = "Study Creator API Worker";
const BANNER_WIDTH: usize = 48;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Registry entry for a named job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TaskJob {
    pub name: String,
    pub active: bool,
    pub failing: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
}

impl TaskJob {
    /// A newly registered, active job that has never run
    pub fn register(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            failing: false,
            last_run: None,
            last_error: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Log captured from one job execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct JobLog {
    pub id: Uuid,
    pub job_name: String,
    pub error: bool,
    pub log: String,
    pub created_at: DateTime<Utc>,
}

/// Accumulates the log text of a running job
pub struct JobRecorder {
    job_name: String,
    started: Instant,
    lines: Vec<String>,
}

impl JobRecorder {
    /// Begin recording and write the preamble
    pub fn start(job_name: &str) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        let rule = "═".repeat(BANNER_WIDTH);
        let lines = vec![
            format!("╔{rule}╗"),
            format!("║ {:<46} ║", SERVICE_NAME),
            format!("╠{rule}╣"),
            format!("║ {:<46} ║", format!("Version: {}", env!("CARGO_PKG_VERSION"))),
            format!("║ {:<46} ║", format!("Job: {job_name}")),
            format!("║ {:<46} ║", format!("Host: {host}")),
            format!("║ {:<46} ║", format!("Date: {}", Utc::now().to_rfc3339())),
            format!("╚{rule}╝"),
        ];

        Self {
            job_name: job_name.to_string(),
            started: Instant::now(),
            lines,
        }
    }

    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Close the log with the execution outcome
    pub fn finish(mut self, error: Option<&str>) -> JobLog {
        match error {
            Some(message) => self.line(format!("There was a problem running the job: {message}")),
            None => self.line("Job exited successfully"),
        }
        self.line(format!("Finished in {:.2}s", self.started.elapsed().as_secs_f64()));

        JobLog {
            id: Uuid::new_v4(),
            job_name: self.job_name,
            error: error.is_some(),
            log: self.lines.join("\n"),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait JobJournal: Send + Sync {
    /// Fetch a job, registering it as active if it is unknown
    async fn get_or_register(&self, name: &str) -> Result<TaskJob, JournalError>;

    /// Record the outcome of an execution and store its log
    async fn record(&self, name: &str, log: &JobLog, last_error: Option<&str>)
        -> Result<(), JournalError>;
}

// ============================================================================
// In-memory journal
// ============================================================================

#[derive(Default)]
struct MemoryJournalInner {
    jobs: HashMap<String, TaskJob>,
    logs: Vec<JobLog>,
}

#[derive(Default)]
pub struct MemoryJobJournal {
    inner: Mutex<MemoryJournalInner>,
}

impl MemoryJobJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, name: &str, active: bool) {
        self.lock()
            .jobs
            .entry(name.to_string())
            .or_insert_with(|| TaskJob::register(name))
            .active = active;
    }

    pub fn job(&self, name: &str) -> Option<TaskJob> {
        self.lock().jobs.get(name).cloned()
    }

    pub fn logs(&self) -> Vec<JobLog> {
        self.lock().logs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryJournalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobJournal for MemoryJobJournal {
    async fn get_or_register(&self, name: &str) -> Result<TaskJob, JournalError> {
        Ok(self
            .lock()
            .jobs
            .entry(name.to_string())
            .or_insert_with(|| TaskJob::register(name))
            .clone())
    }

    async fn record(
        &self,
        name: &str,
        log: &JobLog,
        last_error: Option<&str>,
    ) -> Result<(), JournalError> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .entry(name.to_string())
            .or_insert_with(|| TaskJob::register(name));
        job.failing = last_error.is_some();
        job.last_error = last_error.unwrap_or_default().to_string();
        job.last_run = Some(log.created_at);
        inner.logs.push(log.clone());
        Ok(())
    }
}

// ============================================================================
// Postgres journal
// ============================================================================

#[derive(Clone)]
pub struct PgJobJournal {
    pool: PgPool,
}

impl PgJobJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobJournal for PgJobJournal {
    async fn get_or_register(&self, name: &str) -> Result<TaskJob, JournalError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO task_jobs (name, active, failing, last_error)
            VALUES ($1, TRUE, FALSE, '')
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            tracing::info!(job = name, "Registered new unscheduled job");
        }

        let job = sqlx::query_as::<_, TaskJob>(
            r#"
            SELECT name, active, failing, last_run, last_error, created_at
            FROM task_jobs
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(job)
    }

    async fn record(
        &self,
        name: &str,
        log: &JobLog,
        last_error: Option<&str>,
    ) -> Result<(), JournalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE task_jobs
            SET failing = $2, last_error = $3, last_run = $4
            WHERE name = $1
            "#,
        )
        .bind(name)
        .bind(last_error.is_some())
        .bind(last_error.unwrap_or_default())
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO job_logs (id, job_name, error, log, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(log.id)
        .bind(&log.job_name)
        .bind(log.error)
        .bind(&log.log)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_preamble_and_outcome() {
        let mut recorder = JobRecorder::start("run_ingest");
        recorder.line("Preparing ingest run");
        let log = recorder.finish(Some("boom"));

        assert!(log.error);
        assert_eq!(log.job_name, "run_ingest");
        assert!(log.log.contains(SERVICE_NAME));
        assert!(log.log.contains("Job: run_ingest"));
        assert!(log.log.contains("Preparing ingest run"));
        assert!(log.log.contains("There was a problem running the job: boom"));
        assert!(log.log.contains("Finished in"));
    }

    #[tokio::test]
    async fn test_memory_journal_registers_and_records() {
        let journal = MemoryJobJournal::new();

        let job = journal.get_or_register("cancel_ingest").await.unwrap();
        assert!(job.active);
        assert!(job.last_run.is_none());

        let log = JobRecorder::start("cancel_ingest").finish(None);
        journal.record("cancel_ingest", &log, None).await.unwrap();

        let job = journal.job("cancel_ingest").unwrap();
        assert!(!job.failing);
        assert_eq!(job.last_run, Some(log.created_at));
        assert_eq!(journal.logs(), vec![log]);
    }

    #[tokio::test]
    async fn test_memory_journal_keeps_inactive_flag() {
        let journal = MemoryJobJournal::new();
        journal.set_active("run_ingest", false);

        assert!(!journal.get_or_register("run_ingest").await.unwrap().active);
    }
}
