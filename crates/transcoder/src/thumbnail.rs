use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use vodpack_core::{FrameSize, JobStage, JobWarning, StageOutcome};

use crate::CodecEngine;

/// Capture the preview image.
///
/// The frame is taken at `at`; if the source is known to be shorter than
/// that, or the capture fails or comes back empty, one retry is made at the
/// first frame. Any remaining failure is a `Warning`: the job goes on
/// without a thumbnail.
pub async fn generate_thumbnail(
    engine: &dyn CodecEngine,
    source: &Path,
    at: Duration,
    size: FrameSize,
    output: &Path,
    known_duration: Option<f64>,
) -> StageOutcome<PathBuf> {
    let too_short = known_duration.is_some_and(|d| d < at.as_secs_f64());
    let first_try = if too_short { Duration::ZERO } else { at };

    let err = match engine.extract_frame(source, first_try, size, output).await {
        Ok(()) => return StageOutcome::Ok(output.to_path_buf()),
        Err(e) => e,
    };

    if first_try.is_zero() {
        return thumbnail_warning(err);
    }

    debug!(error = %err, "frame capture failed, retrying at the first frame");
    match engine
        .extract_frame(source, Duration::ZERO, size, output)
        .await
    {
        Ok(()) => StageOutcome::Ok(output.to_path_buf()),
        Err(e) => thumbnail_warning(e),
    }
}

fn thumbnail_warning(err: crate::EngineError) -> StageOutcome<PathBuf> {
    warn!(error = %err, "thumbnail generation failed, continuing without one");
    StageOutcome::Warning(JobWarning::new(
        JobStage::Encoding,
        "thumbnail",
        err.to_string(),
    ))
}
