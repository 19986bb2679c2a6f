use std::path::Path;

use tracing::warn;
use vodpack_core::{JobStage, JobWarning, StageOutcome, TechnicalMetadata};

use crate::CodecEngine;
use crate::ffprobe::{ProbeReport, parse_frame_rate};

/// Probe `source` once and build its technical metadata.
///
/// A failed probe is not fatal: it yields a `Warning` and the job carries on
/// without metadata. An unparseable frame rate yields `Partial` with the
/// field left absent.
pub async fn extract_metadata(
    engine: &dyn CodecEngine,
    source: &Path,
) -> StageOutcome<TechnicalMetadata> {
    match engine.probe(source).await {
        Ok(report) => from_report(&report),
        Err(e) => {
            warn!(source = %source.display(), error = %e, "probe failed, continuing without metadata");
            StageOutcome::Warning(JobWarning::new(
                JobStage::Probing,
                "metadata",
                e.to_string(),
            ))
        }
    }
}

pub fn from_report(report: &ProbeReport) -> StageOutcome<TechnicalMetadata> {
    let video = report.video.as_ref();

    let mut frame_rate_warning = None;
    let frame_rate = match video.and_then(|v| v.frame_rate.as_deref()) {
        Some(raw) => match parse_frame_rate(raw) {
            Ok(fps) => Some(fps),
            Err(e) => {
                warn!(error = %e, "ignoring unusable frame rate");
                frame_rate_warning = Some(JobWarning::new(
                    JobStage::Probing,
                    "frame_rate",
                    e.to_string(),
                ));
                None
            }
        },
        None => None,
    };

    let meta = TechnicalMetadata {
        duration_secs: report.duration_secs,
        size_bytes: report.size_bytes,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        video_codec: video.and_then(|v| v.codec.clone()),
        bit_rate: report.bit_rate,
        frame_rate,
        audio_codec: report.audio.as_ref().and_then(|a| a.codec.clone()),
    };

    match frame_rate_warning {
        Some(warning) => StageOutcome::Partial {
            value: meta,
            warning,
        },
        None => StageOutcome::Ok(meta),
    }
}
