//! [`CodecEngine`] backed by the `ffmpeg` and `ffprobe` binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use vodpack_core::{FrameSize, QualityTier};

use crate::command::ToolCommand;
use crate::ffprobe::{self, ProbeReport};
use crate::{CodecEngine, EngineError, TranscoderConfig};

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    config: TranscoderConfig,
}

impl Ffmpeg {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }
}

/// Segment filename pattern for a tier. Labels prefix the segment names so
/// every rendition can live under one key prefix next to the master playlist.
pub fn segment_pattern(tier: &QualityTier) -> String {
    format!("{}_%03d.ts", tier.label)
}

/// Arguments for encoding one tier as a full-length (non-sliding) HLS VOD stream.
pub fn hls_args(
    config: &TranscoderConfig,
    input: &Path,
    tier: &QualityTier,
    output_dir: &Path,
) -> Vec<String> {
    let playlist = output_dir.join(tier.playlist_name());
    let segments = output_dir.join(segment_pattern(tier));

    vec![
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        // Video: baseline H.264 for the widest player compatibility.
        "-c:v".into(),
        "libx264".into(),
        "-profile:v".into(),
        "baseline".into(),
        "-level".into(),
        "3.0".into(),
        "-preset".into(),
        config.preset.clone(),
        "-b:v".into(),
        tier.bitrate_arg(),
        "-maxrate".into(),
        tier.bitrate_arg(),
        "-bufsize".into(),
        tier.bufsize_arg(),
        "-s".into(),
        tier.frame_size.to_string(),
        "-g".into(),
        config.gop_size.to_string(),
        "-sc_threshold".into(),
        "0".into(),
        // Audio
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        config.audio_bitrate.clone(),
        "-ar".into(),
        config.audio_sample_rate.to_string(),
        // HLS output
        "-f".into(),
        "hls".into(),
        "-start_number".into(),
        "0".into(),
        "-hls_time".into(),
        config.segment_secs.to_string(),
        "-hls_list_size".into(),
        "0".into(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_segment_filename".into(),
        segments.to_string_lossy().into_owned(),
        playlist.to_string_lossy().into_owned(),
    ]
}

/// Arguments for grabbing one frame at `at`, scaled to fit inside `size`.
pub fn frame_args(input: &Path, at: Duration, size: FrameSize, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", at.as_secs_f64()),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-frames:v".into(),
        "1".into(),
        "-an".into(),
        "-vf".into(),
        format!(
            "scale={}:{}:force_original_aspect_ratio=decrease",
            size.width, size.height
        ),
        "-q:v".into(),
        "2".into(),
        output.to_string_lossy().into_owned(),
    ]
}

async fn non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl CodecEngine for Ffmpeg {
    async fn probe(&self, source: &Path) -> Result<ProbeReport, EngineError> {
        ffprobe::probe(&self.config.ffprobe_path, source, self.config.probe_timeout).await
    }

    async fn transcode(
        &self,
        source: &Path,
        tier: &QualityTier,
        output_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut cmd = ToolCommand::new(self.config.ffmpeg_path.clone(), self.config.encode_timeout);
        cmd.args(hls_args(&self.config, source, tier, output_dir));
        info!(tier = %tier.label, size = %tier.frame_size, "spawning ffmpeg for HLS rendition");

        let output = cmd.run().await.map_err(|e| match e {
            EngineError::Timeout { .. } | EngineError::BinaryNotFound(_) => e,
            other => EngineError::Encode {
                tier: tier.label.clone(),
                message: other.to_string(),
            },
        })?;
        if !output.status.success() {
            return Err(EngineError::Encode {
                tier: tier.label.clone(),
                message: format!("ffmpeg exited with {}: {}", output.status, output.stderr_tail()),
            });
        }

        let playlist = output_dir.join(tier.playlist_name());
        if !non_empty_file(&playlist).await {
            return Err(EngineError::Encode {
                tier: tier.label.clone(),
                message: format!("ffmpeg succeeded but wrote no playlist at {}", playlist.display()),
            });
        }
        debug!(tier = %tier.label, playlist = %playlist.display(), "rendition encoded");
        Ok(playlist)
    }

    async fn extract_frame(
        &self,
        source: &Path,
        at: Duration,
        size: FrameSize,
        output: &Path,
    ) -> Result<(), EngineError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = ToolCommand::new(self.config.ffmpeg_path.clone(), self.config.frame_timeout);
        cmd.args(frame_args(source, at, size, output));

        let result = cmd.run().await?;
        if !result.status.success() {
            return Err(EngineError::FrameExtract(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                result.stderr_tail()
            )));
        }
        // Seeking past the end exits 0 without writing a frame.
        if !non_empty_file(output).await {
            return Err(EngineError::FrameExtract(format!(
                "no frame at {:.3}s",
                at.as_secs_f64()
            )));
        }
        Ok(())
    }
}
