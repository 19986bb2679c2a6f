//! Per-job scratch directories.
//!
//! Every job owns `<work_root>/<job_id>/`; nothing else writes there. The
//! directory is created exclusively, so two jobs can never share one.

use std::io;
use std::path::{Path, PathBuf};

use vodpack_core::QualityTier;

use crate::job::{JobId, sanitize_filename};

/// Directory under the work root where received uploads wait for their job.
pub const STAGING_DIR: &str = "uploads";

pub fn staging_dir(work_root: &Path) -> PathBuf {
    work_root.join(STAGING_DIR)
}

/// Where the workspace of `job_id` lives, whether or not it exists.
pub fn workspace_path(work_root: &Path, job_id: &str) -> PathBuf {
    work_root.join(job_id)
}

/// Copy each file into `staging` under a unique name; each job owns and
/// deletes its copy. All or nothing: on the first failure the copies made so
/// far are removed and the failing input is returned with its error.
pub async fn stage_uploads(
    files: &[PathBuf],
    staging: &Path,
) -> Result<Vec<PathBuf>, (PathBuf, io::Error)> {
    let mut staged = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = staging.join(format!(
            "{}-{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_filename(&name)
        ));
        if let Err(e) = tokio::fs::copy(file, &target).await {
            let _ = tokio::fs::remove_file(&target).await;
            for copy in &staged {
                let _ = tokio::fs::remove_file(copy).await;
            }
            return Err((file.clone(), e));
        }
        staged.push(target);
    }
    Ok(staged)
}

#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Allocate the directory for `job_id` under `work_root`.
    pub async fn create(work_root: &Path, job_id: &JobId) -> io::Result<Self> {
        tokio::fs::create_dir_all(work_root).await?;
        let root = workspace_path(work_root, job_id.as_str());
        // create_dir, not create_dir_all: an existing directory is a collision.
        tokio::fs::create_dir(&root).await?;
        tokio::fs::create_dir(root.join("hls")).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent of the per-tier output directories.
    pub fn hls_dir(&self) -> PathBuf {
        self.root.join("hls")
    }

    pub fn tier_dir(&self, tier: &QualityTier) -> PathBuf {
        self.hls_dir().join(&tier.label)
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.root.join("thumbnail.jpg")
    }

    pub fn master_path(&self) -> PathBuf {
        self.root.join("master.m3u8")
    }
}
