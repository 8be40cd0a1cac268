//! Postgres implementation of [`IngestRunStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use creator_common::InputFingerprint;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{EventType, IngestRun, IngestRunEvent, VersionRef};
use super::state::{IngestRunState, StateEvent};
use super::store::{IngestRunStore, ListFilter, NewIngestRun, StoreError, Transition};

const RUN_COLUMNS: &str = "id, name, state, input_fingerprint, creator_id, job_log_id, \
                           created_at, started_at, stopped_at";

#[derive(Debug, FromRow)]
struct IngestRunRow {
    id: Uuid,
    name: String,
    state: String,
    input_fingerprint: Option<String>,
    creator_id: Option<String>,
    job_log_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

impl TryFrom<IngestRunRow> for IngestRun {
    type Error = StoreError;

    fn try_from(row: IngestRunRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<IngestRunState>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let input_fingerprint = row
            .input_fingerprint
            .map(InputFingerprint::parse)
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(IngestRun {
            id: row.id,
            name: row.name,
            state,
            input_fingerprint,
            creator_id: row.creator_id,
            job_log_id: row.job_log_id,
            created_at: row.created_at,
            started_at: row.started_at,
            stopped_at: row.stopped_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    ingest_run_id: Uuid,
    event_type: String,
    description: String,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for IngestRunEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type = EventType::from_code(&row.event_type)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown event type '{}'", row.event_type)))?;

        Ok(IngestRunEvent {
            id: row.id,
            ingest_run_id: row.ingest_run_id,
            event_type,
            description: row.description,
            user_id: row.user_id,
            created_at: row.created_at,
        })
    }
}

/// Store backed by the `ingest_runs` family of tables
#[derive(Clone)]
pub struct PgIngestRunStore {
    pool: PgPool,
}

impl PgIngestRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_event<'e, E>(executor: E, event: &IngestRunEvent) -> Result<(), StoreError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO ingest_run_events (id, ingest_run_id, event_type, description, user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(event.ingest_run_id)
        .bind(event.event_type.code())
        .bind(&event.description)
        .bind(&event.user_id)
        .bind(event.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl IngestRunStore for PgIngestRunStore {
    #[tracing::instrument(skip(self, new_run), fields(count = new_run.version_ids.len()))]
    async fn create(&self, new_run: &NewIngestRun) -> Result<IngestRun, StoreError> {
        let (run, version_ids) = new_run.clone().into_run();
        let event = IngestRunEvent::new(run.id, EventType::Initialized, run.creator_id.clone());

        let mut tx = self.pool.begin().await?;

        // Locked so a catalogue row cannot disappear before commit
        let known: Vec<String> = sqlx::query_scalar(
            "SELECT kf_id FROM file_versions WHERE kf_id = ANY($1) FOR SHARE",
        )
        .bind(&version_ids)
        .fetch_all(&mut *tx)
        .await?;
        if let Some(missing) = version_ids.iter().find(|v| !known.contains(v)) {
            return Err(StoreError::UnknownVersion(missing.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO ingest_runs (id, name, state, input_fingerprint, creator_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run.id)
        .bind(&run.name)
        .bind(run.state.as_str())
        .bind(run.input_fingerprint.as_ref().map(InputFingerprint::as_str))
        .bind(&run.creator_id)
        .bind(run.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ingest_run_versions (ingest_run_id, version_id)
            SELECT $1, v FROM UNNEST($2::TEXT[]) AS v
            "#,
        )
        .bind(run.id)
        .bind(&version_ids)
        .execute(&mut *tx)
        .await?;

        Self::insert_event(&mut *tx, &event).await?;
        tx.commit().await?;

        Ok(run)
    }

    async fn get(&self, id: Uuid) -> Result<Option<IngestRun>, StoreError> {
        let row: Option<IngestRunRow> =
            sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM ingest_runs WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(IngestRun::try_from).transpose()
    }

    async fn versions(&self, id: Uuid) -> Result<Vec<VersionRef>, StoreError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT fv.kf_id, fv.file_name, fv.file_type
            FROM ingest_run_versions irv
            JOIN file_versions fv ON fv.kf_id = irv.version_id
            WHERE irv.ingest_run_id = $1
            ORDER BY fv.kf_id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(kf_id, file_name, file_type)| VersionRef {
                kf_id,
                file_name,
                file_type,
            })
            .collect())
    }

    async fn store_fingerprint(
        &self,
        id: Uuid,
        fingerprint: &InputFingerprint,
        name: &str,
    ) -> Result<IngestRun, StoreError> {
        let row: Option<IngestRunRow> = sqlx::query_as(&format!(
            "UPDATE ingest_runs SET input_fingerprint = $2, name = $3 WHERE id = $1 \
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(id)
        .bind(fingerprint.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
    }

    #[tracing::instrument(skip(self))]
    async fn transition(
        &self,
        id: Uuid,
        event: StateEvent,
        user_id: Option<&str>,
    ) -> Result<Transition, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<IngestRunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM ingest_runs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut run: IngestRun = row.ok_or(StoreError::NotFound(id))?.try_into()?;

        let next = run.state.apply(event)?;
        if next == run.state {
            tx.rollback().await?;
            return Ok(Transition {
                run,
                changed: false,
            });
        }

        run.stamp(next, Utc::now());

        sqlx::query(
            r#"
            UPDATE ingest_runs
            SET state = $2, started_at = $3, stopped_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(run.state.as_str())
        .bind(run.started_at)
        .bind(run.stopped_at)
        .execute(&mut *tx)
        .await?;

        if let Some(event_type) = EventType::for_state(next) {
            let audit = IngestRunEvent::new(id, event_type, user_id.map(str::to_string));
            Self::insert_event(&mut *tx, &audit).await?;
        }

        tx.commit().await?;

        Ok(Transition { run, changed: true })
    }

    async fn find_running_duplicates(
        &self,
        fingerprint: &InputFingerprint,
        exclude: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM ingest_runs
            WHERE input_fingerprint = $1 AND state = $2 AND id <> $3
            ORDER BY created_at
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(IngestRunState::Running.as_str())
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn attach_job_log(&self, id: Uuid, job_log_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE ingest_runs SET job_log_id = $2 WHERE id = $1")
            .bind(id)
            .bind(job_log_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn events(&self, id: Uuid) -> Result<Vec<IngestRunEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, ingest_run_id, event_type, description, user_id, created_at
            FROM ingest_run_events
            WHERE ingest_run_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IngestRunEvent::try_from).collect()
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<IngestRun>, StoreError> {
        let rows: Vec<IngestRunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM ingest_runs \
             WHERE ($1::TEXT IS NULL OR state = $1) \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(filter.state.map(|s| s.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IngestRun::try_from).collect()
    }
}
