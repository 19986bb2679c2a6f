use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::types::JobStage;

/// Blob store failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("upload of {key} timed out after {after:?}")]
    Timeout { key: String, after: Duration },
    #[error("upload of {0} cancelled")]
    Cancelled(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog store failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fatal-to-job failure reasons.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid source file: {0}")]
    InvalidSource(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("no quality tier produced a rendition")]
    NoRenditions,

    #[error("master playlist would be empty")]
    EmptyManifest,

    #[error("upload of {artifact} failed: {source}")]
    Upload {
        artifact: String,
        #[source]
        source: StorageError,
    },

    #[error("catalog write failed: {0}")]
    Persist(#[from] PersistenceError),

    #[error("illegal stage transition {from} -> {to}")]
    InvalidTransition { from: JobStage, to: JobStage },
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSource(_) => "invalid_source",
            Self::Workspace(_) => "workspace_error",
            Self::NoRenditions => "no_renditions",
            Self::EmptyManifest => "empty_manifest",
            Self::Upload { .. } => "upload_failed",
            Self::Persist(_) => "persist_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    pub fn upload(artifact: impl Into<String>, source: StorageError) -> Self {
        Self::Upload {
            artifact: artifact.into(),
            source,
        }
    }
}

/// A recoverable-per-unit failure: logged, recorded, and the job goes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct JobWarning {
    pub stage: JobStage,
    /// What the warning is about, e.g. a tier label or `thumbnail`.
    pub subject: String,
    pub message: String,
}

impl JobWarning {
    pub fn new(stage: JobStage, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.subject, self.message)
    }
}

/// The single structured failure handed back to the caller of a job.
#[derive(Debug, Error)]
#[error("job {job_id} failed during {stage}: {error}")]
pub struct JobFailure {
    pub job_id: String,
    pub stage: JobStage,
    #[source]
    pub error: PipelineError,
    pub warnings: Vec<JobWarning>,
}

impl JobFailure {
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from(self)
    }
}

/// JSON error envelope: `{ "error": { "code": "…", "message": "…", "details": {} } }`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl From<&JobFailure> for ErrorEnvelope {
    fn from(f: &JobFailure) -> Self {
        Self {
            error: ErrorBody {
                code: f.error.code().to_string(),
                message: f.to_string(),
                details: serde_json::json!({
                    "job_id": f.job_id,
                    "stage": f.stage,
                    "warnings": f.warnings,
                }),
            },
        }
    }
}
