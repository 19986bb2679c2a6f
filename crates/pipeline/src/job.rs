use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use vodpack_core::{JobStage, JobWarning, PipelineError};

/// Unique job identifier: UTC timestamp plus a random UUID, e.g.
/// `20261019143000-6f1c…`. Sorts by submission time; two jobs submitted in
/// the same second still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let ts = chrono::Utc::now().format("%Y%m%d%H%M%S");
        Self(format!("{ts}-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ingest request in flight. Only the orchestrator mutates it.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub source_path: PathBuf,
    pub original_filename: String,
    pub title: String,
    stage: JobStage,
    warnings: Vec<JobWarning>,
}

impl Job {
    pub fn new(source_path: &Path, original_filename: &str, title: Option<String>) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(original_filename));
        Self {
            id: JobId::generate(),
            source_path: source_path.to_path_buf(),
            original_filename: original_filename.to_string(),
            title,
            stage: JobStage::Received,
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn warnings(&self) -> &[JobWarning] {
        &self.warnings
    }

    pub fn warnings_mut(&mut self) -> &mut Vec<JobWarning> {
        &mut self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<JobWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Move to `to`, rejecting anything the stage machine does not allow.
    pub fn advance(&mut self, to: JobStage) -> Result<(), PipelineError> {
        if !self.stage.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        info!(job_id = %self.id, from = %self.stage, to = %to, "stage change");
        self.stage = to;
        Ok(())
    }
}

/// Filename without its extension; falls back to the full name.
pub fn default_title(original_filename: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .trim();
    if stem.is_empty() {
        original_filename.to_string()
    } else {
        stem.to_string()
    }
}

/// Reduce an uploaded filename to a single safe key segment.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "source".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique_and_time_prefixed() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        let (ts, rest) = a.as_str().split_once('-').unwrap();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(rest.len(), 32);
    }

    #[test]
    fn advance_follows_stage_machine() {
        let mut job = Job::new(Path::new("/up/x"), "clip.mp4", None);
        job.advance(JobStage::Probing).unwrap();
        let err = job.advance(JobStage::Uploading).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        job.advance(JobStage::Failed).unwrap();
        assert!(job.advance(JobStage::Failed).is_err());
    }

    #[test]
    fn title_defaults_to_file_stem() {
        assert_eq!(Job::new(Path::new("x"), "My Clip.mov", None).title, "My Clip");
        assert_eq!(
            Job::new(Path::new("x"), "a.mp4", Some("  Launch  ".into())).title,
            "Launch"
        );
        assert_eq!(Job::new(Path::new("x"), "a.mp4", Some(" ".into())).title, "a");
    }

    #[test]
    fn filenames_become_single_key_segments() {
        assert_eq!(sanitize_filename("my clip (1).mp4"), "my_clip__1_.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\a.mov"), "a.mov");
        assert_eq!(sanitize_filename(".."), "source");
        assert_eq!(sanitize_filename(""), "source");
    }
}
