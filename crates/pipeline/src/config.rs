use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vodpack_core::QualityTier;
use vodpack_core::types::default_ladder;
use vodpack_transcoder::TranscoderConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },
}

fn invalid(var: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        message: message.into(),
    }
}

/// Settings for one [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of every per-job working directory.
    pub work_root: PathBuf,
    pub transcoder: TranscoderConfig,
    /// Encoding ladder, in manifest order.
    pub tiers: Vec<QualityTier>,
    pub max_tier_encodes: usize,
    /// Budget for a single object put.
    pub upload_timeout: Duration,
    /// Concurrent puts within one rendition directory.
    pub upload_concurrency: usize,
    pub upload_source: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("vodpack"),
            transcoder: TranscoderConfig::default(),
            tiers: default_ladder(),
            max_tier_encodes: 2,
            upload_timeout: Duration::from_secs(120),
            upload_concurrency: 8,
            upload_source: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from `VODPACK_*` variables resolved through `lookup`; anything
    /// unset keeps its default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(dir) = lookup("VODPACK_WORK_DIR") {
            cfg.work_root = dir.into();
        }
        if let Some(path) = lookup("VODPACK_FFMPEG") {
            cfg.transcoder.ffmpeg_path = path.into();
        }
        if let Some(path) = lookup("VODPACK_FFPROBE") {
            cfg.transcoder.ffprobe_path = path.into();
        }
        if let Some(raw) = lookup("VODPACK_TIERS") {
            cfg.tiers = parse_tiers(&raw)?;
        }
        if let Some(n) = lookup("VODPACK_MAX_TIER_ENCODES") {
            cfg.max_tier_encodes = positive("VODPACK_MAX_TIER_ENCODES", &n)? as usize;
        }
        if let Some(secs) = lookup("VODPACK_ENCODE_TIMEOUT_SECS") {
            cfg.transcoder.encode_timeout =
                Duration::from_secs(positive("VODPACK_ENCODE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("VODPACK_UPLOAD_TIMEOUT_SECS") {
            cfg.upload_timeout = Duration::from_secs(positive("VODPACK_UPLOAD_TIMEOUT_SECS", &secs)?);
        }
        if let Some(flag) = lookup("VODPACK_UPLOAD_SOURCE") {
            cfg.upload_source = parse_bool("VODPACK_UPLOAD_SOURCE", &flag)?;
        }

        Ok(cfg)
    }
}

/// Concurrent jobs for one `vodpack ingest` run, from `VODPACK_MAX_JOBS`.
pub fn max_jobs_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<usize, ConfigError> {
    match lookup("VODPACK_MAX_JOBS") {
        Some(raw) => Ok(positive("VODPACK_MAX_JOBS", &raw)? as usize),
        None => Ok(2),
    }
}

fn positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid(var, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(_) => Err(invalid(var, format!("{raw:?} is not a whole number"))),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, format!("{raw:?} is not a boolean"))),
    }
}

/// Comma-separated `label=WxH@kbps` entries. Labels must be unique.
pub fn parse_tiers(raw: &str) -> Result<Vec<QualityTier>, ConfigError> {
    let mut tiers: Vec<QualityTier> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let tier: QualityTier = entry.parse().map_err(|e: String| invalid("VODPACK_TIERS", e))?;
        if tiers.iter().any(|t| t.label == tier.label) {
            return Err(invalid(
                "VODPACK_TIERS",
                format!("duplicate tier label {:?}", tier.label),
            ));
        }
        tiers.push(tier);
    }
    if tiers.is_empty() {
        return Err(invalid("VODPACK_TIERS", "no tiers given"));
    }
    Ok(tiers)
}
