use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ProbeError;

/// Broad classification of a container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

/// One stream inside a probed container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Stream index within the container, usable in an ffmpeg `-map 0:N`.
    pub index: u32,
    pub kind: StreamKind,
    pub codec: String,
    pub language: Option<String>,
    pub title: Option<String>,
    /// Whether the container marks this stream as the default of its kind.
    pub default: bool,
}

/// What a probe learned about one media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Container duration in seconds. Zero when the container does not
    /// declare one (some live captures).
    pub duration_secs: f64,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// The stream ffmpeg would pick for `-map 0:v:0` equivalents: the
    /// default-flagged video stream, else the first video stream.
    pub fn default_video_stream(&self) -> Option<&StreamInfo> {
        let videos = || self.streams.iter().filter(|s| s.kind == StreamKind::Video);
        videos().find(|s| s.default).or_else(|| videos().next())
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Audio)
    }
}

/// Inspects a media file. The cache sits in front of this trait; tests
/// substitute a mock that serves canned [`MediaInfo`].
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, kind: StreamKind, default: bool) -> StreamInfo {
        StreamInfo {
            index,
            kind,
            codec: "h264".to_string(),
            language: None,
            title: None,
            default,
        }
    }

    #[test]
    fn test_default_video_prefers_flagged_stream() {
        let info = MediaInfo {
            path: PathBuf::from("a.mkv"),
            duration_secs: 10.0,
            streams: vec![
                stream(0, StreamKind::Video, false),
                stream(1, StreamKind::Video, true),
                stream(2, StreamKind::Audio, true),
            ],
        };
        assert_eq!(info.default_video_stream().map(|s| s.index), Some(1));
    }

    #[test]
    fn test_default_video_falls_back_to_first() {
        let info = MediaInfo {
            path: PathBuf::from("a.mkv"),
            duration_secs: 10.0,
            streams: vec![
                stream(0, StreamKind::Audio, false),
                stream(1, StreamKind::Video, false),
                stream(2, StreamKind::Video, false),
            ],
        };
        assert_eq!(info.default_video_stream().map(|s| s.index), Some(1));
    }

    #[test]
    fn test_audio_streams_filter() {
        let info = MediaInfo {
            path: PathBuf::from("a.mkv"),
            duration_secs: 10.0,
            streams: vec![
                stream(0, StreamKind::Video, true),
                stream(1, StreamKind::Audio, true),
                stream(2, StreamKind::Subtitle, false),
                stream(3, StreamKind::Audio, false),
            ],
        };
        let audio: Vec<u32> = info.audio_streams().map(|s| s.index).collect();
        assert_eq!(audio, vec![1, 3]);
    }
}
