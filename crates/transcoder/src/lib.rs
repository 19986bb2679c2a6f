#![allow(clippy::collapsible_if, clippy::redundant_closure)]
pub mod command;
pub mod encoder;
pub mod ffmpeg;
pub mod ffprobe;
pub mod hls;
pub mod metadata;
pub mod thumbnail;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use vodpack_core::{FrameSize, QualityTier};

use crate::ffprobe::ProbeReport;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("ffmpeg/ffprobe not found at {0}")]
    BinaryNotFound(PathBuf),
    #[error("ffprobe failed: {0}")]
    Probe(String),
    #[error("encode of {tier} failed: {message}")]
    Encode { tier: String, message: String },
    #[error("frame extraction failed: {0}")]
    FrameExtract(String),
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec engine settings.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub segment_secs: u32,
    pub audio_sample_rate: u32,
    pub audio_bitrate: String,
    pub preset: String,
    pub gop_size: u32,
    /// Where in the source the preview frame is taken.
    pub thumbnail_at: Duration,
    /// Bounding box for the preview image.
    pub thumbnail_size: FrameSize,
    pub probe_timeout: Duration,
    pub encode_timeout: Duration,
    pub frame_timeout: Duration,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            segment_secs: 10,
            audio_sample_rate: 44_100,
            audio_bitrate: "128k".into(),
            preset: "fast".into(),
            gop_size: 48,
            thumbnail_at: Duration::from_secs(1),
            thumbnail_size: FrameSize::new(320, 240),
            probe_timeout: Duration::from_secs(60),
            encode_timeout: Duration::from_secs(2 * 60 * 60),
            frame_timeout: Duration::from_secs(60),
        }
    }
}

/// Request/response access to the external encoder and prober.
///
/// Each call is one subprocess invocation with a bounded wall-clock budget;
/// a timeout is reported like any other failure of that operation.
#[async_trait::async_trait]
pub trait CodecEngine: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<ProbeReport, EngineError>;

    /// Encode `source` at `tier` into `output_dir` as a segmented VOD stream.
    /// Returns the path of the rendition playlist.
    async fn transcode(
        &self,
        source: &Path,
        tier: &QualityTier,
        output_dir: &Path,
    ) -> Result<PathBuf, EngineError>;

    /// Write one still frame taken at `at` to `output`, scaled to fit `size`.
    async fn extract_frame(
        &self,
        source: &Path,
        at: Duration,
        size: FrameSize,
        output: &Path,
    ) -> Result<(), EngineError>;
}
