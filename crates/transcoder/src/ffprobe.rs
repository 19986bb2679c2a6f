use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EngineError;
use crate::command::ToolCommand;

/// What a single ffprobe run reports about a source file.
///
/// Values are kept as reported; the frame rate in particular stays a raw
/// rational string until [`parse_frame_rate`] turns it into a number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub container: Option<String>,
    pub duration_secs: Option<f64>,
    pub size_bytes: Option<u64>,
    pub bit_rate: Option<u64>,
    pub video: Option<VideoStream>,
    pub audio: Option<AudioStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub index: u32,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// `r_frame_rate`, e.g. `30000/1001`.
    pub frame_rate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    pub index: u32,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Run ffprobe on a file and parse the JSON output.
pub async fn probe(
    ffprobe_path: &Path,
    file: &Path,
    timeout: Duration,
) -> Result<ProbeReport, EngineError> {
    let mut cmd = ToolCommand::new(ffprobe_path.to_path_buf(), timeout);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .args([file.to_string_lossy().into_owned()]);

    let output = cmd.run().await?;
    if !output.status.success() {
        let detail = output.stderr_tail();
        return Err(EngineError::Probe(if detail.is_empty() {
            format!("ffprobe exited with {}", output.status)
        } else {
            detail
        }));
    }

    let raw: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| EngineError::Probe(format!("parse JSON: {e}")))?;

    parse_probe_output(&raw)
}

/// ffprobe emits most numbers as JSON strings; accept either form.
fn number_field<T: std::str::FromStr>(v: Option<&serde_json::Value>) -> Option<T> {
    match v? {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn string_field(v: Option<&serde_json::Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn parse_probe_output(raw: &serde_json::Value) -> Result<ProbeReport, EngineError> {
    let format = raw
        .get("format")
        .ok_or_else(|| EngineError::Probe("missing 'format'".into()))?;

    let container = string_field(format.get("format_name"));
    let duration_secs: Option<f64> =
        number_field::<f64>(format.get("duration")).filter(|d| d.is_finite() && *d >= 0.0);
    let size_bytes: Option<u64> = number_field(format.get("size"));
    let bit_rate: Option<u64> = number_field(format.get("bit_rate"));

    let streams = raw
        .get("streams")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut video = None;
    let mut audio = None;

    for s in &streams {
        let codec_type = s.get("codec_type").and_then(|v| v.as_str()).unwrap_or("");
        let index = s.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let codec = string_field(s.get("codec_name"));

        match codec_type {
            "video" => {
                // Cover art is exposed as a single-frame video stream.
                let attached_pic = s
                    .get("disposition")
                    .and_then(|d| d.get("attached_pic"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    == 1;
                if video.is_none() && !attached_pic {
                    video = Some(VideoStream {
                        index,
                        codec,
                        width: number_field(s.get("width")),
                        height: number_field(s.get("height")),
                        frame_rate: string_field(s.get("r_frame_rate")),
                    });
                }
            }
            "audio" => {
                if audio.is_none() {
                    audio = Some(AudioStream {
                        index,
                        codec,
                        sample_rate: number_field(s.get("sample_rate")),
                        channels: number_field(s.get("channels")),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(ProbeReport {
        container,
        duration_secs,
        size_bytes,
        bit_rate,
        video,
        audio,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameRateError {
    #[error("frame rate {0:?} is not a number or num/den")]
    Malformed(String),
    #[error("frame rate {0:?} has a zero denominator")]
    ZeroDenominator(String),
    #[error("frame rate {0:?} is not positive")]
    NotPositive(String),
}

/// Parse a prober frame rate (`30000/1001`, `25/1`, `29.97`) into frames per
/// second, rounded to three decimals.
pub fn parse_frame_rate(s: &str) -> Result<f64, FrameRateError> {
    let trimmed = s.trim();
    let malformed = || FrameRateError::Malformed(s.to_string());

    let value = if let Some((num, den)) = trimmed.split_once('/') {
        let n: u64 = num.trim().parse().map_err(|_| malformed())?;
        let d: u64 = den.trim().parse().map_err(|_| malformed())?;
        if d == 0 {
            return Err(FrameRateError::ZeroDenominator(s.to_string()));
        }
        n as f64 / d as f64
    } else {
        trimmed.parse::<f64>().map_err(|_| malformed())?
    };

    if !value.is_finite() {
        return Err(malformed());
    }
    if value <= 0.0 {
        return Err(FrameRateError::NotPositive(s.to_string()));
    }
    Ok((value * 1000.0).round() / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_json() {
        let json = serde_json::json!({
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "12.345000",
                "size": "1048576",
                "bit_rate": "679477"
            },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30000/1001"
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "sample_rate": "48000",
                    "channels": 2
                },
                {
                    "index": 2,
                    "codec_type": "audio",
                    "codec_name": "ac3"
                }
            ]
        });

        let report = parse_probe_output(&json).unwrap();
        assert_eq!(report.container.as_deref(), Some("mov,mp4,m4a,3gp,3g2,mj2"));
        assert!((report.duration_secs.unwrap() - 12.345).abs() < 1e-9);
        assert_eq!(report.size_bytes, Some(1_048_576));
        assert_eq!(report.bit_rate, Some(679_477));

        let v = report.video.unwrap();
        assert_eq!(v.codec.as_deref(), Some("h264"));
        assert_eq!(v.width, Some(1920));
        assert_eq!(v.height, Some(1080));
        assert_eq!(v.frame_rate.as_deref(), Some("30000/1001"));

        let a = report.audio.unwrap();
        assert_eq!(a.codec.as_deref(), Some("aac"));
        assert_eq!(a.sample_rate, Some(48_000));
        assert_eq!(a.channels, Some(2));
    }

    #[test]
    fn skips_cover_art_and_tolerates_missing_fields() {
        let json = serde_json::json!({
            "format": { "format_name": "mp3" },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "mjpeg",
                    "disposition": { "attached_pic": 1 }
                },
                { "index": 1, "codec_type": "audio", "codec_name": "mp3" }
            ]
        });
        let report = parse_probe_output(&json).unwrap();
        assert!(report.video.is_none());
        assert_eq!(report.duration_secs, None);
        assert_eq!(report.size_bytes, None);
        assert_eq!(report.audio.unwrap().codec.as_deref(), Some("mp3"));
    }

    #[test]
    fn missing_format_is_a_probe_error() {
        let err = parse_probe_output(&serde_json::json!({ "streams": [] })).unwrap_err();
        assert!(matches!(err, EngineError::Probe(_)));
    }

    #[test]
    fn frame_rate_parsing() {
        assert_eq!(parse_frame_rate("30000/1001").unwrap(), 29.97);
        assert_eq!(parse_frame_rate("24000/1001").unwrap(), 23.976);
        assert_eq!(parse_frame_rate("25/1").unwrap(), 25.0);
        assert_eq!(parse_frame_rate("29.97").unwrap(), 29.97);
        assert_eq!(
            parse_frame_rate("0/0"),
            Err(FrameRateError::ZeroDenominator("0/0".into()))
        );
        assert_eq!(
            parse_frame_rate("0/1"),
            Err(FrameRateError::NotPositive("0/1".into()))
        );
        assert!(matches!(
            parse_frame_rate("process.exit()"),
            Err(FrameRateError::Malformed(_))
        ));
        assert!(matches!(parse_frame_rate("1/2/3"), Err(FrameRateError::Malformed(_))));
        assert!(matches!(parse_frame_rate("inf"), Err(FrameRateError::Malformed(_))));
    }
}
