use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pixel dimensions, rendered as `WIDTHxHEIGHT` (the HLS `RESOLUTION` syntax).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("frame size {s:?} is not WIDTHxHEIGHT"))?;
        let width: u32 = w
            .parse()
            .map_err(|_| format!("bad width in frame size {s:?}"))?;
        let height: u32 = h
            .parse()
            .map_err(|_| format!("bad height in frame size {s:?}"))?;
        let size = Self { width, height };
        if !size.is_valid() {
            return Err(format!("frame size {s:?} has a zero dimension"));
        }
        Ok(size)
    }
}

/// One entry of the static encoding ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTier {
    pub label: String,
    pub frame_size: FrameSize,
    pub bitrate_kbps: u32,
    /// Value advertised as `BANDWIDTH` in the master playlist.
    pub bandwidth: u64,
}

impl QualityTier {
    pub fn new(label: &str, frame_size: FrameSize, bitrate_kbps: u32) -> Self {
        Self {
            label: label.to_string(),
            frame_size,
            bitrate_kbps,
            bandwidth: u64::from(bitrate_kbps) * 1000,
        }
    }

    /// Target bitrate in encoder notation, e.g. `2500k`.
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }

    /// Rate-control buffer: twice the target bitrate.
    pub fn bufsize_arg(&self) -> String {
        format!("{}k", u64::from(self.bitrate_kbps) * 2)
    }

    /// Per-rendition playlist filename, `<label>.m3u8`.
    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.label)
    }
}

/// Parses `label=WIDTHxHEIGHT@KBPS`, e.g. `360p=640x360@700`.
impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, rest) = s
            .trim()
            .split_once('=')
            .ok_or_else(|| format!("tier {s:?} is not label=WxH@kbps"))?;
        let label = label.trim();
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("tier label {label:?} must be non-empty [A-Za-z0-9_-]"));
        }
        let (size, kbps) = rest
            .split_once('@')
            .ok_or_else(|| format!("tier {s:?} is missing @kbps"))?;
        let frame_size: FrameSize = size.parse()?;
        let bitrate_kbps: u32 = kbps
            .trim()
            .parse()
            .map_err(|_| format!("bad bitrate in tier {s:?}"))?;
        if bitrate_kbps == 0 {
            return Err(format!("tier {s:?} has a zero bitrate"));
        }
        Ok(Self::new(label, frame_size, bitrate_kbps))
    }
}

/// The default four-rung ladder: 240p, 480p, 720p, 1080p.
pub fn default_ladder() -> Vec<QualityTier> {
    vec![
        QualityTier::new("240p", FrameSize::new(426, 240), 400),
        QualityTier::new("480p", FrameSize::new(854, 480), 800),
        QualityTier::new("720p", FrameSize::new(1280, 720), 2500),
        QualityTier::new("1080p", FrameSize::new(1920, 1080), 5000),
    ]
}

/// An encoded HLS rendition on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub label: String,
    pub bandwidth: u64,
    pub frame_size: FrameSize,
    /// Directory holding this rendition's playlist and segments, and nothing else.
    pub dir: PathBuf,
    pub playlist: PathBuf,
}

impl Rendition {
    pub fn summary(&self) -> RenditionSummary {
        RenditionSummary {
            label: self.label.clone(),
            bandwidth: self.bandwidth,
            frame_size: self.frame_size,
        }
    }
}

/// The persisted view of a rendition: no local paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionSummary {
    pub label: String,
    pub bandwidth: u64,
    pub frame_size: FrameSize,
}

/// Descriptive technical metadata from a single probe of the source.
///
/// Every field is optional: a container may omit any of them and an
/// unparseable value is left absent rather than guessed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalMetadata {
    pub duration_secs: Option<f64>,
    pub size_bytes: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub bit_rate: Option<u64>,
    pub frame_rate: Option<f64>,
    pub audio_codec: Option<String>,
}

impl TechnicalMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Where a durable object lives in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub key: String,
    pub url: String,
}

/// The only state that outlives a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub title: String,
    pub source: Option<Locator>,
    pub thumbnail: Option<Locator>,
    pub manifest: Locator,
    pub renditions: Vec<RenditionSummary>,
    /// `None` when probing failed outright.
    pub metadata: Option<TechnicalMetadata>,
}

/// Job lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Received,
    Probing,
    Encoding,
    Composing,
    Uploading,
    Persisting,
    Done,
    Failed,
}

impl JobStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Probing => "probing",
            Self::Encoding => "encoding",
            Self::Composing => "composing",
            Self::Uploading => "uploading",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "probing" => Some(Self::Probing),
            "encoding" => Some(Self::Encoding),
            "composing" => Some(Self::Composing),
            "uploading" => Some(Self::Uploading),
            "persisting" => Some(Self::Persisting),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The forward successor on the success path.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Probing),
            Self::Probing => Some(Self::Encoding),
            Self::Encoding => Some(Self::Composing),
            Self::Composing => Some(Self::Uploading),
            Self::Uploading => Some(Self::Persisting),
            Self::Persisting => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// `Failed` is reachable from any non-terminal stage; otherwise only the
    /// direct successor is.
    pub fn can_transition_to(self, to: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
