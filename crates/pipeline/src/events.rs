use vodpack_core::{JobStage, JobWarning};

/// Job progress broadcast to anyone subscribed to a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    #[serde(rename = "stage_changed")]
    StageChanged {
        job_id: String,
        source_name: String,
        stage: JobStage,
    },
    #[serde(rename = "warning")]
    Warning { job_id: String, warning: JobWarning },
    #[serde(rename = "completed")]
    Completed {
        job_id: String,
        catalog_id: String,
        warnings: Vec<JobWarning>,
    },
    #[serde(rename = "failed")]
    Failed {
        job_id: String,
        stage: JobStage,
        code: String,
        message: String,
        warnings: Vec<JobWarning>,
    },
}

impl PipelineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::StageChanged { job_id, .. }
            | Self::Warning { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }
}
