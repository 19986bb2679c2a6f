//! HLS master playlist composition and content-type helpers.

use std::fmt::Write as _;
use std::path::Path;

use tracing::warn;
use vodpack_core::{JobStage, JobWarning, PipelineError, Rendition};

/// Content-Type for HLS master/variant playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Content-Type for MPEG-TS segments.
pub const SEGMENT_CONTENT_TYPE_TS: &str = "video/MP2T";

/// Content-Type for fMP4 segments.
pub const SEGMENT_CONTENT_TYPE_MP4: &str = "video/mp4";

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Filename of the master playlist inside a job's HLS prefix.
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

/// Content type for a file inside a rendition directory.
pub fn segment_content_type(filename: &str) -> &'static str {
    if filename.ends_with(".m3u8") {
        PLAYLIST_CONTENT_TYPE
    } else if filename.ends_with(".m4s") || filename.ends_with(".mp4") {
        SEGMENT_CONTENT_TYPE_MP4
    } else {
        SEGMENT_CONTENT_TYPE_TS
    }
}

/// Content type for an uploaded source file, guessed from its extension.
pub fn source_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("ts") => SEGMENT_CONTENT_TYPE_TS,
        _ => OCTET_STREAM,
    }
}

/// The composed master playlist text, the renditions it lists, and a
/// warning for every rendition left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedManifest {
    pub text: String,
    /// Exactly the renditions referenced by `text`, in playlist order. Only
    /// these are published.
    pub renditions: Vec<Rendition>,
    pub warnings: Vec<JobWarning>,
}

/// Build the master playlist referencing each rendition's playlist by relative name.
///
/// Lines appear in the order given. A rendition with an empty label, zero
/// bandwidth or a zero dimension is skipped with a warning; if nothing is
/// left the result is [`PipelineError::EmptyManifest`].
pub fn compose_master_playlist(renditions: &[Rendition]) -> Result<ComposedManifest, PipelineError> {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    let mut warnings = Vec::new();
    let mut included = Vec::with_capacity(renditions.len());

    for r in renditions {
        let problem = if r.label.is_empty() {
            Some("empty label")
        } else if r.bandwidth == 0 {
            Some("zero bandwidth")
        } else if !r.frame_size.is_valid() {
            Some("invalid frame size")
        } else {
            None
        };
        if let Some(problem) = problem {
            warn!(rendition = %r.label, problem, "leaving rendition out of master playlist");
            warnings.push(JobWarning::new(JobStage::Composing, r.label.clone(), problem));
            continue;
        }

        // Writing into a String cannot fail.
        let _ = write!(
            text,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}.m3u8\n",
            r.bandwidth, r.frame_size, r.label
        );
        included.push(r.clone());
    }

    if included.is_empty() {
        return Err(PipelineError::EmptyManifest);
    }
    Ok(ComposedManifest {
        text,
        renditions: included,
        warnings,
    })
}
