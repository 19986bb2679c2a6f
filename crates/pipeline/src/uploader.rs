//! Pushes a job's local artifacts to the blob store.
//!
//! Every key is written to the ledger before its put starts, so a rollback
//! also covers puts that were aborted midway. Once a required artifact fails
//! the uploader is cancelled and no further put begins.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vodpack_core::ports::BlobStore;
use vodpack_core::{JobStage, JobWarning, Locator, PipelineError, Rendition, StorageError};
use vodpack_transcoder::hls::{
    MASTER_PLAYLIST_NAME, PLAYLIST_CONTENT_TYPE, THUMBNAIL_CONTENT_TYPE, segment_content_type,
    source_content_type,
};

pub fn hls_prefix(job_id: &str) -> String {
    format!("hls/{job_id}")
}

pub fn master_key(job_id: &str) -> String {
    format!("{}/{MASTER_PLAYLIST_NAME}", hls_prefix(job_id))
}

pub fn thumbnail_key(job_id: &str) -> String {
    format!("thumbnails/{job_id}.jpg")
}

pub fn source_key(job_id: &str, sanitized_name: &str) -> String {
    format!("sources/{job_id}/{sanitized_name}")
}

/// The local artifact set of one job.
#[derive(Debug)]
pub struct UploadPlan<'a> {
    /// Source file and the key segment to store it under.
    pub source: Option<(&'a Path, String)>,
    pub thumbnail: Option<&'a Path>,
    pub renditions: &'a [Rendition],
    pub master: &'a Path,
}

#[derive(Debug)]
pub struct UploadedArtifacts {
    pub source: Option<Locator>,
    pub thumbnail: Option<Locator>,
    pub manifest: Locator,
    pub warnings: Vec<JobWarning>,
}

/// Outcome of a compensating delete pass.
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub deleted: usize,
    pub failed: Vec<(String, String)>,
}

pub struct Uploader<'a> {
    store: &'a dyn BlobStore,
    job_id: &'a str,
    timeout: Duration,
    concurrency: usize,
    cancel: CancellationToken,
    ledger: Mutex<Vec<String>>,
}

impl<'a> Uploader<'a> {
    pub fn new(store: &'a dyn BlobStore, job_id: &'a str, timeout: Duration, concurrency: usize) -> Self {
        Self {
            store,
            job_id,
            timeout,
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
            ledger: Mutex::new(Vec::new()),
        }
    }

    /// Stop starting new puts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Keys whose put has started, in start order.
    pub fn started_keys(&self) -> Vec<String> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub async fn put_object(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<Locator, StorageError> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled(key.to_string()));
        }
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.to_string());

        debug!(job_id = self.job_id, key, len = bytes.len(), "put");
        match tokio::time::timeout(self.timeout, self.store.put(bytes, key, content_type)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                key: key.to_string(),
                after: self.timeout,
            }),
        }
    }

    pub async fn put_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<Locator, StorageError> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled(key.to_string()));
        }
        let bytes = tokio::fs::read(path).await?;
        self.put_object(Bytes::from(bytes), key, content_type).await
    }

    /// Upload every regular file in `dir` as `<prefix>/<file name>`.
    ///
    /// Media files go first and playlists last, so a playlist never lands
    /// before the segments it lists. Returns the number of objects written.
    pub async fn put_dir(&self, dir: &Path, prefix: &str) -> Result<usize, StorageError> {
        let mut media = Vec::new();
        let mut playlists = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".m3u8") {
                playlists.push((entry.path(), name));
            } else {
                media.push((entry.path(), name));
            }
        }
        media.sort();
        playlists.sort();

        let mut count = 0;
        for group in [media, playlists] {
            count += self.put_group(group, prefix).await?;
        }
        Ok(count)
    }

    async fn put_group(&self, files: Vec<(PathBuf, String)>, prefix: &str) -> Result<usize, StorageError> {
        let mut puts = futures::stream::iter(files)
            .map(|(path, name)| async move {
                let key = format!("{prefix}/{name}");
                self.put_file(&path, &key, segment_content_type(&name)).await
            })
            .buffer_unordered(self.concurrency);

        let mut count = 0;
        while let Some(result) = puts.next().await {
            result?;
            count += 1;
        }
        Ok(count)
    }

    /// Upload all renditions as one batch: either every file lands or the
    /// batch failed.
    pub async fn put_hls_batch(&self, renditions: &[Rendition]) -> Result<usize, StorageError> {
        let prefix = hls_prefix(self.job_id);
        let counts = try_join_all(renditions.iter().map(|r| self.put_dir(&r.dir, &prefix))).await?;
        Ok(counts.into_iter().sum())
    }

    /// Upload the whole plan. The master playlist is put only after the
    /// rendition batch has fully succeeded.
    pub async fn upload(&self, plan: UploadPlan<'_>) -> Result<UploadedArtifacts, PipelineError> {
        let job_id = self.job_id;

        let source = async {
            let Some((path, name)) = &plan.source else {
                return Ok(None);
            };
            let result = self
                .put_file(path, &source_key(job_id, name), source_content_type(path))
                .await;
            if result.is_err() {
                self.cancel();
            }
            result.map(Some)
        };

        let thumbnail = async {
            match plan.thumbnail {
                Some(path) => Some(
                    self.put_file(path, &thumbnail_key(job_id), THUMBNAIL_CONTENT_TYPE)
                        .await,
                ),
                None => None,
            }
        };

        let hls = async {
            let result = self.put_hls_batch(plan.renditions).await;
            if result.is_err() {
                self.cancel();
            }
            result
        };

        let (source, thumbnail, hls) = tokio::join!(source, thumbnail, hls);

        let objects = hls.map_err(|e| PipelineError::upload("hls", e))?;
        let source = source.map_err(|e| PipelineError::upload("source", e))?;

        let mut warnings = Vec::new();
        let thumbnail = match thumbnail {
            Some(Ok(loc)) => Some(loc),
            Some(Err(e)) => {
                warn!(job_id, error = %e, "thumbnail upload failed, continuing without it");
                warnings.push(JobWarning::new(
                    JobStage::Uploading,
                    "thumbnail",
                    e.to_string(),
                ));
                None
            }
            None => None,
        };

        let manifest = self
            .put_file(plan.master, &master_key(job_id), PLAYLIST_CONTENT_TYPE)
            .await
            .map_err(|e| {
                self.cancel();
                PipelineError::upload("manifest", e)
            })?;

        info!(job_id, hls_objects = objects, "upload complete");
        Ok(UploadedArtifacts {
            source,
            thumbnail,
            manifest,
            warnings,
        })
    }

    /// Best-effort delete of every key this uploader started. Failures are
    /// logged and reported, never raised.
    pub async fn rollback(&self) -> RollbackReport {
        self.cancel();
        let keys = self.started_keys();
        let results: Vec<_> = futures::stream::iter(keys)
            .map(|key| async move {
                let result = self.store.delete(&key).await;
                (key, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RollbackReport::default();
        for (key, result) in results {
            match result {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(job_id = self.job_id, key = %key, error = %e, "rollback delete failed");
                    report.failed.push((key, e.to_string()));
                }
            }
        }
        info!(
            job_id = self.job_id,
            deleted = report.deleted,
            failed = report.failed.len(),
            "rolled back uploads"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodpack_core::FrameSize;
    use vodpack_storage::MemoryBlobStore;

    struct Fixture {
        _tmp: tempfile::TempDir,
        source: PathBuf,
        thumbnail: PathBuf,
        master: PathBuf,
        renditions: Vec<Rendition>,
    }

    fn fixture(labels: &[&str]) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut renditions = Vec::new();
        for label in labels {
            let dir = tmp.path().join("hls").join(label);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..3 {
                std::fs::write(dir.join(format!("{label}_{i:03}.ts")), b"ts").unwrap();
            }
            let playlist = dir.join(format!("{label}.m3u8"));
            std::fs::write(&playlist, b"#EXTM3U\n").unwrap();
            renditions.push(Rendition {
                label: label.to_string(),
                bandwidth: 400_000,
                frame_size: FrameSize::new(426, 240),
                dir,
                playlist,
            });
        }
        let source = tmp.path().join("upload.bin");
        std::fs::write(&source, b"source").unwrap();
        let thumbnail = tmp.path().join("thumbnail.jpg");
        std::fs::write(&thumbnail, b"jpg").unwrap();
        let master = tmp.path().join("master.m3u8");
        std::fs::write(&master, b"#EXTM3U\n").unwrap();
        Fixture {
            _tmp: tmp,
            source,
            thumbnail,
            master,
            renditions,
        }
    }

    fn plan(f: &Fixture) -> UploadPlan<'_> {
        UploadPlan {
            source: Some((f.source.as_path(), "clip.mp4".to_string())),
            thumbnail: Some(f.thumbnail.as_path()),
            renditions: &f.renditions,
            master: &f.master,
        }
    }

    #[tokio::test]
    async fn uploads_everything_with_master_last() {
        let f = fixture(&["240p", "720p"]);
        let store = MemoryBlobStore::default();
        let up = Uploader::new(&store, "job1", Duration::from_secs(5), 4);

        let done = up.upload(plan(&f)).await.unwrap();
        assert_eq!(done.manifest.key, "hls/job1/master.m3u8");
        assert_eq!(done.source.unwrap().key, "sources/job1/clip.mp4");
        assert_eq!(done.thumbnail.unwrap().key, "thumbnails/job1.jpg");
        assert!(done.warnings.is_empty());

        // 2 renditions x (3 segments + playlist), master, source, thumbnail
        assert_eq!(store.keys().len(), 11);
        let order = store.put_order();
        assert_eq!(order.last().map(String::as_str), Some("hls/job1/master.m3u8"));
        let playlist_pos = order.iter().position(|k| k == "hls/job1/240p.m3u8").unwrap();
        let segment_pos = order.iter().position(|k| k == "hls/job1/240p_002.ts").unwrap();
        assert!(segment_pos < playlist_pos);

        let seg = store.get("hls/job1/720p_000.ts").unwrap();
        assert_eq!(seg.content_type, "video/MP2T");
        let master = store.get("hls/job1/master.m3u8").unwrap();
        assert_eq!(master.content_type, PLAYLIST_CONTENT_TYPE);
        assert_eq!(store.get("thumbnails/job1.jpg").unwrap().content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn failed_rendition_batch_blocks_master_and_rolls_back() {
        let f = fixture(&["240p", "720p"]);
        let store = MemoryBlobStore::default().fail_on("720p_001");
        let up = Uploader::new(&store, "job1", Duration::from_secs(5), 1);

        let err = up.upload(plan(&f)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload { ref artifact, .. } if artifact == "hls"));
        assert!(up.is_cancelled());
        assert!(store.get("hls/job1/master.m3u8").is_none());
        assert!(!up.started_keys().contains(&"hls/job1/master.m3u8".to_string()));

        let report = up.rollback().await;
        assert!(report.failed.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn thumbnail_failure_is_only_a_warning() {
        let f = fixture(&["240p"]);
        let store = MemoryBlobStore::default().fail_on("thumbnails/");
        let up = Uploader::new(&store, "job1", Duration::from_secs(5), 4);

        let done = up.upload(plan(&f)).await.unwrap();
        assert!(done.thumbnail.is_none());
        assert_eq!(done.warnings.len(), 1);
        assert_eq!(done.warnings[0].subject, "thumbnail");
        assert!(store.get("hls/job1/master.m3u8").is_some());
    }

    #[tokio::test]
    async fn source_failure_is_fatal() {
        let f = fixture(&["240p"]);
        let store = MemoryBlobStore::default().fail_on("sources/");
        let up = Uploader::new(&store, "job1", Duration::from_secs(5), 4);

        let err = up.upload(plan(&f)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload { ref artifact, .. } if artifact == "source"));
        assert!(store.get("hls/job1/master.m3u8").is_none());
    }

    #[tokio::test]
    async fn no_put_starts_after_cancel() {
        let store = MemoryBlobStore::default();
        let up = Uploader::new(&store, "job1", Duration::from_secs(5), 4);
        up.cancel();
        let err = up
            .put_object(Bytes::from_static(b"x"), "hls/job1/a.ts", "video/MP2T")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Cancelled(_)));
        assert!(up.started_keys().is_empty());
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn slow_put_times_out() {
        let store = MemoryBlobStore::default().with_put_delay(Duration::from_millis(500));
        let up = Uploader::new(&store, "job1", Duration::from_millis(20), 4);
        let err = up
            .put_object(Bytes::from_static(b"x"), "hls/job1/a.ts", "video/MP2T")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));
        // The aborted put is still in the ledger for rollback.
        assert_eq!(up.started_keys(), ["hls/job1/a.ts"]);
    }
}
