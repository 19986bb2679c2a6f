//! Mirrors pipeline events into the `job` table.

use std::future::Future;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, warn};
use vodpack_core::JobStage;
use vodpack_db::repo::jobs;

use crate::events::PipelineEvent;

/// Consume events until the pipeline is dropped.
pub async fn record_events(pool: SqlitePool, mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "job recorder fell behind, some stage changes were not recorded");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if let Err(e) = apply(&pool, &event).await {
            error!(job_id = %event.job_id(), error = %e, "failed to record job event");
        }
    }
}

async fn apply(pool: &SqlitePool, event: &PipelineEvent) -> Result<(), sqlx::Error> {
    match event {
        PipelineEvent::StageChanged {
            job_id,
            source_name,
            stage: JobStage::Received,
        } => {
            jobs::create_job(pool, job_id, source_name).await?;
        }
        PipelineEvent::StageChanged {
            job_id,
            source_name,
            stage,
        } => {
            if !with_retry(|| jobs::update_job_stage(pool, job_id, stage.as_str())).await? {
                // The creating event was missed; start the row here.
                warn!(job_id = %job_id, stage = %stage, "no job row to update, creating it");
                jobs::create_job(pool, job_id, source_name).await?;
                with_retry(|| jobs::update_job_stage(pool, job_id, stage.as_str())).await?;
            }
        }
        PipelineEvent::Warning { .. } => {}
        PipelineEvent::Completed {
            job_id,
            catalog_id,
            warnings,
        } => {
            let warnings_json = serde_json::to_string(warnings).ok();
            let updated = with_retry(|| {
                jobs::finish_job(
                    pool,
                    job_id,
                    JobStage::Done.as_str(),
                    Some(catalog_id.as_str()),
                    None,
                    None,
                    warnings_json.as_deref(),
                )
            })
            .await?;
            if !updated {
                warn!(job_id = %job_id, "no job row for finished job");
            }
        }
        PipelineEvent::Failed {
            job_id,
            code,
            message,
            warnings,
            ..
        } => {
            let warnings_json = serde_json::to_string(warnings).ok();
            let updated = with_retry(|| {
                jobs::finish_job(
                    pool,
                    job_id,
                    JobStage::Failed.as_str(),
                    None,
                    Some(code.as_str()),
                    Some(message.as_str()),
                    warnings_json.as_deref(),
                )
            })
            .await?;
            if !updated {
                warn!(job_id = %job_id, "no job row for finished job");
            }
        }
    }
    Ok(())
}

/// Retry a job-table write a few times; SQLite may briefly report busy
/// while another connection writes. Returns whether a row was touched.
async fn with_retry<F, Fut>(mut op: F) -> Result<bool, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(touched) => return Ok(touched),
            Err(e) if attempt >= 4 => return Err(e),
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(120)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodpack_core::JobWarning;

    #[tokio::test]
    async fn events_become_job_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pool = vodpack_db::open(dir.path().join("jobs.db").to_str().unwrap())
            .await
            .unwrap();

        let (tx, rx) = broadcast::channel(16);
        let recorder = tokio::spawn(record_events(pool.clone(), rx));

        tx.send(PipelineEvent::StageChanged {
            job_id: "j1".into(),
            source_name: "a.mp4".into(),
            stage: JobStage::Received,
        })
        .unwrap();
        tx.send(PipelineEvent::StageChanged {
            job_id: "j1".into(),
            source_name: "a.mp4".into(),
            stage: JobStage::Encoding,
        })
        .unwrap();
        tx.send(PipelineEvent::Failed {
            job_id: "j1".into(),
            stage: JobStage::Encoding,
            code: "no_renditions".into(),
            message: "no quality tier produced a rendition".into(),
            warnings: vec![JobWarning::new(JobStage::Encoding, "480p", "exit 1")],
        })
        .unwrap();
        drop(tx);
        recorder.await.unwrap();

        let row = jobs::get_job(&pool, "j1").await.unwrap().unwrap();
        assert_eq!(row.stage, "failed");
        assert_eq!(row.error_code.as_deref(), Some("no_renditions"));
        assert!(row.warnings_json.unwrap().contains("480p"));
    }

    #[tokio::test]
    async fn missed_creation_is_repaired_on_next_stage() {
        let dir = tempfile::tempdir().unwrap();
        let pool = vodpack_db::open(dir.path().join("jobs.db").to_str().unwrap())
            .await
            .unwrap();

        let (tx, rx) = broadcast::channel(16);
        let recorder = tokio::spawn(record_events(pool.clone(), rx));

        // No Received event for this job.
        tx.send(PipelineEvent::StageChanged {
            job_id: "j2".into(),
            source_name: "b.mp4".into(),
            stage: JobStage::Uploading,
        })
        .unwrap();
        tx.send(PipelineEvent::Failed {
            job_id: "j2".into(),
            stage: JobStage::Uploading,
            code: "upload_failed".into(),
            message: "upload of hls/j2/240p_000.ts failed".into(),
            warnings: Vec::new(),
        })
        .unwrap();
        drop(tx);
        recorder.await.unwrap();

        let row = jobs::get_job(&pool, "j2").await.unwrap().unwrap();
        assert_eq!(row.source_name, "b.mp4");
        assert_eq!(row.stage, "failed");
        assert_eq!(row.error_code.as_deref(), Some("upload_failed"));
    }
}
