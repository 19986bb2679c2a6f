//! Local state removal at the end of a job.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// What one cleanup pass removed and what it could not.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove the job's working directory and the received upload file.
///
/// Never fails: a path that is already gone counts as removed, and any other
/// error is logged and reported without affecting the job's outcome. Safe to
/// call more than once.
pub async fn cleanup_job(job_id: &str, workspace: Option<&Path>, upload: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    if let Some(dir) = workspace {
        record(&mut report, job_id, dir, tokio::fs::remove_dir_all(dir).await);
    }
    record(&mut report, job_id, upload, tokio::fs::remove_file(upload).await);

    report
}

/// Remove a workspace whose job never reached its own cleanup.
pub async fn remove_workspace(job_id: &str, workspace: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    record(&mut report, job_id, workspace, tokio::fs::remove_dir_all(workspace).await);
    report
}

/// Empty the upload staging directory. Only safe while no job is running.
pub async fn sweep_staging(dir: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            report.failed.push((dir.to_path_buf(), e.to_string()));
            return report;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                report.failed.push((dir.to_path_buf(), e.to_string()));
                break;
            }
        };
        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(t) if t.is_dir() => tokio::fs::remove_dir_all(&path).await,
            _ => tokio::fs::remove_file(&path).await,
        };
        record(&mut report, "staging", &path, result);
    }
    report
}

fn record(report: &mut CleanupReport, job_id: &str, path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => {
            debug!(job_id, path = %path.display(), "removed");
            report.removed.push(path.to_path_buf());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            report.removed.push(path.to_path_buf());
        }
        Err(e) => {
            warn!(job_id, path = %path.display(), error = %e, "cleanup could not remove path");
            report.failed.push((path.to_path_buf(), e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_workspace_and_upload_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = tmp.path().join("job");
        std::fs::create_dir_all(ws.join("hls/720p")).unwrap();
        std::fs::write(ws.join("hls/720p/720p.m3u8"), b"x").unwrap();
        let upload = tmp.path().join("upload.bin");
        std::fs::write(&upload, b"video").unwrap();

        let first = cleanup_job("job", Some(&ws), &upload).await;
        assert!(first.is_clean());
        assert!(!ws.exists());
        assert!(!upload.exists());

        let second = cleanup_job("job", Some(&ws), &upload).await;
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn works_without_a_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let upload = tmp.path().join("upload.bin");
        std::fs::write(&upload, b"video").unwrap();
        let report = cleanup_job("job", None, &upload).await;
        assert!(report.is_clean());
        assert_eq!(report.removed, [upload.clone()]);
        assert!(!upload.exists());
    }

    #[tokio::test]
    async fn staging_sweep_empties_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("uploads");
        std::fs::create_dir_all(staging.join("stray")).unwrap();
        std::fs::write(staging.join("abc-clip.mp4"), b"video").unwrap();

        let report = sweep_staging(&staging).await;
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 2);
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);

        let missing = sweep_staging(&tmp.path().join("none")).await;
        assert!(missing.is_clean());
        assert!(missing.removed.is_empty());
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where a file is expected makes remove_file fail.
        let upload = tmp.path().join("not-a-file");
        std::fs::create_dir(&upload).unwrap();
        let report = cleanup_job("job", None, &upload).await;
        assert_eq!(report.failed.len(), 1);
        assert!(upload.exists());
    }
}
