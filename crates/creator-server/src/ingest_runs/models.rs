//! Ingest run entities and audit events

use chrono::{DateTime, Utc};
use creator_common::InputFingerprint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::IngestRunState;

/// File type of genomic workflow outputs
pub const FILE_TYPE_GWO: &str = "GWO";

/// Prefix of every ingest run display name
pub const DISPLAY_NAME_PREFIX: &str = "INGEST_RUN";

/// A request to ingest a set of file versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRun {
    pub id: Uuid,
    /// Human readable label; empty until the fingerprint is computed
    pub name: String,
    pub state: IngestRunState,
    pub input_fingerprint: Option<InputFingerprint>,
    pub creator_id: Option<String>,
    pub job_log_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl IngestRun {
    /// A fresh run in the `waiting` state
    pub fn new(creator_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            state: IngestRunState::Waiting,
            input_fingerprint: None,
            creator_id,
            job_log_id: None,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
        }
    }

    /// Set the lifecycle markers that accompany a move into `next`
    pub(crate) fn stamp(&mut self, next: IngestRunState, at: DateTime<Utc>) {
        if next == IngestRunState::Running {
            self.started_at = Some(at);
        }
        if next.is_terminal() {
            self.stopped_at = Some(at);
        }
        self.state = next;
    }
}

/// One entry of the external file version catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub kf_id: String,
    pub file_name: String,
    pub file_type: String,
}

impl VersionRef {
    pub fn new(
        kf_id: impl Into<String>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            kf_id: kf_id.into(),
            file_name: file_name.into(),
            file_type: file_type.into(),
        }
    }

    pub fn is_genomic_workflow_output(&self) -> bool {
        self.file_type == FILE_TYPE_GWO
    }
}

/// Audit event codes written alongside each persisted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "IR_INI")]
    Initialized,
    #[serde(rename = "IR_STA")]
    Started,
    #[serde(rename = "IR_COM")]
    Completed,
    #[serde(rename = "IR_FAI")]
    Failed,
    #[serde(rename = "IR_CAN")]
    Canceled,
}

impl EventType {
    pub fn code(&self) -> &'static str {
        match self {
            EventType::Initialized => "IR_INI",
            EventType::Started => "IR_STA",
            EventType::Completed => "IR_COM",
            EventType::Failed => "IR_FAI",
            EventType::Canceled => "IR_CAN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "IR_INI" => Some(EventType::Initialized),
            "IR_STA" => Some(EventType::Started),
            "IR_COM" => Some(EventType::Completed),
            "IR_FAI" => Some(EventType::Failed),
            "IR_CAN" => Some(EventType::Canceled),
            _ => None,
        }
    }

    /// Event recorded when a run enters `state`, if any
    pub fn for_state(state: IngestRunState) -> Option<Self> {
        match state {
            IngestRunState::Waiting => None,
            IngestRunState::Running => Some(EventType::Started),
            IngestRunState::Complete => Some(EventType::Completed),
            IngestRunState::Failed => Some(EventType::Failed),
            IngestRunState::Canceled => Some(EventType::Canceled),
        }
    }

    /// Audit description for an event on `run_id`
    pub fn describe(&self, run_id: Uuid, user: Option<&str>) -> String {
        match self {
            EventType::Initialized => {
                format!("{} started ingest run {}", user.unwrap_or("Someone"), run_id)
            },
            EventType::Started => format!("Ingest Run {} is running", run_id),
            EventType::Completed => format!("Ingest Run {} completed", run_id),
            EventType::Failed => format!("Ingest Run {} failed", run_id),
            EventType::Canceled => format!("Ingest Run {} is canceled", run_id),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Audit trail entry for an ingest run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRunEvent {
    pub id: Uuid,
    pub ingest_run_id: Uuid,
    pub event_type: EventType,
    pub description: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IngestRunEvent {
    pub fn new(run_id: Uuid, event_type: EventType, user_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ingest_run_id: run_id,
            event_type,
            description: event_type.describe(run_id, user_id.as_deref()),
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Display name over the sorted version ids: `INGEST_RUN-<id1>-<id2>`
pub fn display_name<I, S>(version_ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ids: Vec<String> = version_ids
        .into_iter()
        .map(|id| id.as_ref().to_string())
        .collect();
    ids.sort();
    ids.dedup();

    std::iter::once(DISPLAY_NAME_PREFIX.to_string())
        .chain(ids)
        .collect::<Vec<_>>()
        .join("-")
}
