//! Startup recovery for jobs a previous process left unfinished.
//!
//! A job's blob keys follow from its id, its source name and the files in
//! its workspace, so an interrupted job can be rolled back without a stored
//! ledger. Jobs whose catalog record was already written keep their blobs
//! and are marked done.

use std::path::Path;

use sqlx::SqlitePool;
use tracing::{info, warn};
use vodpack_core::JobStage;
use vodpack_core::ports::BlobStore;
use vodpack_db::repo::{jobs, videos};

use crate::cleanup::{remove_workspace, sweep_staging};
use crate::job::sanitize_filename;
use crate::uploader::{hls_prefix, master_key, source_key, thumbnail_key};
use crate::workspace::{staging_dir, workspace_path};

#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Interrupted jobs that were rolled back and marked failed.
    pub failed_jobs: Vec<String>,
    /// Interrupted jobs whose record was already in the catalog.
    pub completed_jobs: Vec<String>,
    pub deleted_keys: usize,
    /// Keys or paths that could not be removed.
    pub leftovers: usize,
}

/// Roll back every job not in a terminal stage and clear the staging area.
///
/// Must run before any new job starts against `work_root`.
pub async fn recover_interrupted(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    work_root: &Path,
) -> Result<RecoveryReport, sqlx::Error> {
    let mut report = RecoveryReport::default();

    for row in jobs::fail_interrupted_jobs(pool).await? {
        let job_id = row.id.as_str();
        let workspace = workspace_path(work_root, job_id);

        match videos::find_by_manifest_key(pool, &master_key(job_id)).await? {
            Some(video_id) => {
                let done = JobStage::Done.as_str();
                jobs::finish_job(pool, job_id, done, Some(&video_id), None, None, None).await?;
                info!(job_id, video_id = %video_id, "interrupted job had already been published");
                report.completed_jobs.push(row.id.clone());
            }
            None => {
                for key in job_keys(job_id, &row.source_name, &workspace).await {
                    match store.delete(&key).await {
                        Ok(()) => report.deleted_keys += 1,
                        Err(e) => {
                            warn!(job_id, key = %key, error = %e, "could not delete blob of interrupted job");
                            report.leftovers += 1;
                        }
                    }
                }
                info!(job_id, "rolled back interrupted job");
                report.failed_jobs.push(row.id.clone());
            }
        }

        report.leftovers += remove_workspace(job_id, &workspace).await.failed.len();
    }

    report.leftovers += sweep_staging(&staging_dir(work_root)).await.failed.len();
    Ok(report)
}

/// Every key the job could have written.
async fn job_keys(job_id: &str, source_name: &str, workspace: &Path) -> Vec<String> {
    let prefix = hls_prefix(job_id);
    let mut keys = vec![
        master_key(job_id),
        thumbnail_key(job_id),
        source_key(job_id, &sanitize_filename(source_name)),
    ];

    let Ok(mut tiers) = tokio::fs::read_dir(workspace.join("hls")).await else {
        return keys;
    };
    while let Ok(Some(tier)) = tiers.next_entry().await {
        let Ok(mut files) = tokio::fs::read_dir(tier.path()).await else {
            continue;
        };
        while let Ok(Some(file)) = files.next_entry().await {
            keys.push(format!("{prefix}/{}", file.file_name().to_string_lossy()));
        }
    }
    keys
}
