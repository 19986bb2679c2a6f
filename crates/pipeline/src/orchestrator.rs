//! The job orchestrator: runs one ingest request through every stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use vodpack_core::ports::{BlobStore, CatalogStore};
use vodpack_core::{
    CatalogRecord, JobFailure, JobStage, JobWarning, PipelineError, StageOutcome,
};
use vodpack_transcoder::CodecEngine;
use vodpack_transcoder::encoder::encode_ladder;
use vodpack_transcoder::hls::compose_master_playlist;
use vodpack_transcoder::metadata::extract_metadata;
use vodpack_transcoder::thumbnail::generate_thumbnail;

use crate::cleanup::cleanup_job;
use crate::config::PipelineConfig;
use crate::events::PipelineEvent;
use crate::job::{Job, sanitize_filename};
use crate::uploader::{UploadPlan, Uploader};
use crate::workspace::JobWorkspace;

/// One accepted upload: the received file and the name it was uploaded as.
///
/// The job takes ownership of `source_path`; it is deleted when the job ends.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_path: PathBuf,
    pub original_filename: String,
    pub title: Option<String>,
}

impl IngestRequest {
    pub fn new(source_path: impl Into<PathBuf>, original_filename: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            original_filename: original_filename.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A finished job: the persisted record and everything that went wrong on the way.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub catalog_id: String,
    pub record: CatalogRecord,
    pub warnings: Vec<JobWarning>,
}

pub struct Pipeline {
    engine: Arc<dyn CodecEngine>,
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn CatalogStore>,
    config: PipelineConfig,
    events: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn CodecEngine>,
        blobs: Arc<dyn BlobStore>,
        catalog: Arc<dyn CatalogStore>,
        config: PipelineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            engine,
            blobs,
            catalog,
            config,
            events,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Run one job to a terminal stage.
    ///
    /// Cleanup runs exactly once before this returns, whatever the outcome.
    /// On failure, anything already uploaded for the job is deleted again.
    pub async fn run(&self, request: IngestRequest) -> Result<JobReport, JobFailure> {
        let mut job = Job::new(
            &request.source_path,
            &request.original_filename,
            request.title,
        );
        let job_id = job.id.to_string();
        info!(job_id = %job_id, source = %job.original_filename, "job received");
        self.emit_stage(&job);

        let uploader = Uploader::new(
            self.blobs.as_ref(),
            &job_id,
            self.config.upload_timeout,
            self.config.upload_concurrency,
        );
        let mut workspace = None;

        let result = self.drive(&mut job, &uploader, &mut workspace).await;

        let outcome = match result {
            Ok(report) => Ok(report),
            Err(err) => {
                let failed_at = job.stage();
                error!(job_id = %job_id, stage = %failed_at, error = %err, "job failed");
                if job.advance(JobStage::Failed).is_ok() {
                    self.emit_stage(&job);
                }
                if !uploader.started_keys().is_empty() {
                    uploader.rollback().await;
                }
                Err(JobFailure {
                    job_id: job_id.clone(),
                    stage: failed_at,
                    error: err,
                    warnings: job.take_warnings(),
                })
            }
        };

        let report = cleanup_job(
            &job_id,
            workspace.as_ref().map(JobWorkspace::root),
            &job.source_path,
        )
        .await;
        if !report.is_clean() {
            warn!(job_id = %job_id, failed = report.failed.len(), "cleanup left paths behind");
        }

        match &outcome {
            Ok(done) => {
                info!(job_id = %job_id, catalog_id = %done.catalog_id, warnings = done.warnings.len(), "job done");
                self.emit(PipelineEvent::Completed {
                    job_id: job_id.clone(),
                    catalog_id: done.catalog_id.clone(),
                    warnings: done.warnings.clone(),
                });
            }
            Err(failure) => self.emit(PipelineEvent::Failed {
                job_id: job_id.clone(),
                stage: failure.stage,
                code: failure.error.code().to_string(),
                message: failure.error.to_string(),
                warnings: failure.warnings.clone(),
            }),
        }
        outcome
    }

    async fn drive(
        &self,
        job: &mut Job,
        uploader: &Uploader<'_>,
        workspace: &mut Option<JobWorkspace>,
    ) -> Result<JobReport, PipelineError> {
        validate_source(&job.source_path).await?;
        let ws = JobWorkspace::create(&self.config.work_root, &job.id).await?;
        *workspace = Some(ws.clone());

        self.advance(job, JobStage::Probing)?;
        let probed = extract_metadata(self.engine.as_ref(), &job.source_path).await;
        let metadata = self.absorb(job, probed)?;

        self.advance(job, JobStage::Encoding)?;
        let tc = &self.config.transcoder;
        let hls_dir = ws.hls_dir();
        let thumbnail_path = ws.thumbnail_path();
        let (ladder, thumbnail) = tokio::join!(
            encode_ladder(
                self.engine.as_ref(),
                &job.source_path,
                &self.config.tiers,
                &hls_dir,
                self.config.max_tier_encodes,
            ),
            generate_thumbnail(
                self.engine.as_ref(),
                &job.source_path,
                tc.thumbnail_at,
                tc.thumbnail_size,
                &thumbnail_path,
                metadata.as_ref().and_then(|m| m.duration_secs),
            ),
        );
        self.record_warnings(job, ladder.warnings);
        let thumbnail = self.absorb(job, thumbnail)?;
        if ladder.renditions.is_empty() {
            return Err(PipelineError::NoRenditions);
        }

        self.advance(job, JobStage::Composing)?;
        let manifest = compose_master_playlist(&ladder.renditions)?;
        self.record_warnings(job, manifest.warnings);
        // Only what the master playlist lists is published.
        let renditions = manifest.renditions;
        let master_path = ws.master_path();
        tokio::fs::write(&master_path, manifest.text.as_bytes()).await?;

        self.advance(job, JobStage::Uploading)?;
        let source = self
            .config
            .upload_source
            .then(|| (job.source_path.as_path(), sanitize_filename(&job.original_filename)));
        let uploaded = uploader
            .upload(UploadPlan {
                source,
                thumbnail: thumbnail.as_deref(),
                renditions: &renditions,
                master: &master_path,
            })
            .await?;
        self.record_warnings(job, uploaded.warnings);

        self.advance(job, JobStage::Persisting)?;
        let record = CatalogRecord {
            title: job.title.clone(),
            source: uploaded.source,
            thumbnail: uploaded.thumbnail,
            manifest: uploaded.manifest,
            renditions: renditions.iter().map(|r| r.summary()).collect(),
            metadata,
        };
        let catalog_id = self.catalog.save(&record).await?;

        self.advance(job, JobStage::Done)?;
        Ok(JobReport {
            job_id: job.id.to_string(),
            catalog_id,
            record,
            warnings: job.warnings().to_vec(),
        })
    }

    fn advance(&self, job: &mut Job, to: JobStage) -> Result<(), PipelineError> {
        job.advance(to)?;
        self.emit_stage(job);
        Ok(())
    }

    fn absorb<T>(&self, job: &mut Job, outcome: StageOutcome<T>) -> Result<Option<T>, PipelineError> {
        let mut warnings = Vec::new();
        let value = outcome.absorb(&mut warnings)?;
        self.record_warnings(job, warnings);
        Ok(value)
    }

    fn record_warnings(&self, job: &mut Job, warnings: Vec<JobWarning>) {
        for warning in warnings {
            self.emit(PipelineEvent::Warning {
                job_id: job.id.to_string(),
                warning: warning.clone(),
            });
            job.warnings_mut().push(warning);
        }
    }

    fn emit_stage(&self, job: &Job) {
        self.emit(PipelineEvent::StageChanged {
            job_id: job.id.to_string(),
            source_name: job.original_filename.clone(),
            stage: job.stage(),
        });
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// The received file must exist, be a regular file and be non-empty.
async fn validate_source(path: &Path) -> Result<(), PipelineError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) => {
            return Err(PipelineError::InvalidSource(format!(
                "{}: {e}",
                path.display()
            )));
        }
    };
    if !meta.is_file() {
        return Err(PipelineError::InvalidSource(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if meta.len() == 0 {
        return Err(PipelineError::InvalidSource(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(())
}
