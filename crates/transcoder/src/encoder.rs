use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use vodpack_core::{JobStage, JobWarning, QualityTier, Rendition, StageOutcome};

use crate::CodecEngine;

/// Encode one tier into its own directory.
pub async fn encode_rendition(
    engine: &dyn CodecEngine,
    source: &Path,
    tier: &QualityTier,
    output_dir: &Path,
) -> StageOutcome<Rendition> {
    match engine.transcode(source, tier, output_dir).await {
        Ok(playlist) => {
            info!(tier = %tier.label, "finished rendition");
            StageOutcome::Ok(Rendition {
                label: tier.label.clone(),
                bandwidth: tier.bandwidth,
                frame_size: tier.frame_size,
                dir: output_dir.to_path_buf(),
                playlist,
            })
        }
        Err(e) => {
            warn!(tier = %tier.label, error = %e, "dropping tier after encode failure");
            StageOutcome::Warning(JobWarning::new(
                JobStage::Encoding,
                tier.label.clone(),
                e.to_string(),
            ))
        }
    }
}

/// Renditions that succeeded, in ladder order, plus one warning per failed tier.
#[derive(Debug, Default)]
pub struct EncodedLadder {
    pub renditions: Vec<Rendition>,
    pub warnings: Vec<JobWarning>,
}

/// Encode every tier under `hls_root/<label>/`, at most `max_parallel` at a time.
///
/// All tiers run to completion regardless of failures elsewhere; the caller
/// decides what an empty result means.
pub async fn encode_ladder(
    engine: &dyn CodecEngine,
    source: &Path,
    tiers: &[QualityTier],
    hls_root: &Path,
    max_parallel: usize,
) -> EncodedLadder {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));

    let tasks = tiers.iter().map(|tier| {
        let permits = permits.clone();
        let output_dir = hls_root.join(&tier.label);
        async move {
            // The semaphore is never closed, so acquire only fails if it were.
            let _permit = permits.acquire_owned().await.ok();
            encode_rendition(engine, source, tier, &output_dir).await
        }
    });

    // join_all keeps input order, which is the ladder order.
    let outcomes = join_all(tasks).await;

    let mut ladder = EncodedLadder::default();
    for outcome in outcomes {
        match outcome {
            StageOutcome::Ok(r) => ladder.renditions.push(r),
            StageOutcome::Partial { value, warning } => {
                ladder.renditions.push(value);
                ladder.warnings.push(warning);
            }
            StageOutcome::Warning(w) => ladder.warnings.push(w),
            StageOutcome::Fatal(e) => ladder.warnings.push(JobWarning::new(
                JobStage::Encoding,
                "ladder",
                e.to_string(),
            )),
        }
    }
    info!(
        succeeded = ladder.renditions.len(),
        failed = ladder.warnings.len(),
        "ladder encode finished"
    );
    ladder
}
