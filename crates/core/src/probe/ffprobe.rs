//! ffprobe-backed prober.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::error::ProbeError;
use super::types::{MediaInfo, MediaProber, StreamInfo, StreamKind};

/// Probes files by running `ffprobe` and parsing its JSON output.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        debug!("probing {}", path.display());

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=index,codec_type,codec_name:stream_tags=language,title:stream_disposition=default",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::ToolMissing {
                        path: self.ffprobe.clone(),
                    }
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ProbeFailed {
                path: path.to_path_buf(),
                reason: stderr.trim().to_string(),
            });
        }

        parse_probe_json(path, &output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default)]
    streams: Vec<RawStream>,
    format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    disposition: RawDisposition,
    #[serde(default)]
    tags: RawTags,
}

#[derive(Debug, Default, Deserialize)]
struct RawDisposition {
    #[serde(default, rename = "default")]
    is_default: u8,
}

#[derive(Debug, Default, Deserialize)]
struct RawTags {
    language: Option<String>,
    title: Option<String>,
}

fn parse_probe_json(path: &Path, bytes: &[u8]) -> Result<MediaInfo, ProbeError> {
    let raw: RawOutput = serde_json::from_slice(bytes).map_err(|e| ProbeError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let duration_secs = raw
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let streams = raw
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            kind: match s.codec_type.as_deref() {
                Some("video") => StreamKind::Video,
                Some("audio") => StreamKind::Audio,
                Some("subtitle") => StreamKind::Subtitle,
                _ => StreamKind::Other,
            },
            codec: s.codec_name.unwrap_or_default(),
            // "und" is ffprobe's stand-in for no language tag.
            language: s.tags.language.filter(|l| l != "und"),
            title: s.tags.title,
            default: s.disposition.is_default != 0,
        })
        .collect();

    Ok(MediaInfo {
        path: path.to_path_buf(),
        duration_secs,
        streams,
    })
}
