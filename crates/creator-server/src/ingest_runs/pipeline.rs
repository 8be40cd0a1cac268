//! Ingest work performed while a run is `running`

use async_trait::async_trait;
use uuid::Uuid;

use super::models::{VersionRef, FILE_TYPE_GWO};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ingesting genomic workflow outputs is disabled")]
    FeatureDisabled,

    #[error("Cannot ingest file version {kf_id} of type '{file_type}'; only {expected} is supported")]
    UnsupportedFileType {
        kf_id: String,
        file_type: String,
        expected: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The replaceable "do the work" step of a run
#[async_trait]
pub trait IngestPipeline: Send + Sync {
    async fn ingest(&self, ingest_run_id: Uuid, versions: &[VersionRef]) -> Result<(), PipelineError>;
}

/// Ingests genomic workflow output manifests
///
/// Accepts a run only when every version is a `GWO` file and the
/// genomic-workflow-outputs feature is on.
#[derive(Debug, Clone)]
pub struct GenomicWorkflowPipeline {
    enabled: bool,
}

impl GenomicWorkflowPipeline {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl IngestPipeline for GenomicWorkflowPipeline {
    #[tracing::instrument(skip(self, versions), fields(count = versions.len()))]
    async fn ingest(&self, ingest_run_id: Uuid, versions: &[VersionRef]) -> Result<(), PipelineError> {
        if let Some(other) = versions.iter().find(|v| !v.is_genomic_workflow_output()) {
            return Err(PipelineError::UnsupportedFileType {
                kf_id: other.kf_id.clone(),
                file_type: other.file_type.clone(),
                expected: FILE_TYPE_GWO,
            });
        }

        if !self.enabled {
            return Err(PipelineError::FeatureDisabled);
        }

        for version in versions {
            tracing::info!(
                ingest_run_id = %ingest_run_id,
                kf_id = %version.kf_id,
                file_name = %version.file_name,
                "Ingesting genomic workflow output manifest"
            );
        }

        Ok(())
    }
}
