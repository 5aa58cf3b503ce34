use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::runner::{RunnerConfig, ToolCheck};
use crate::scheduler::SchedulerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Paths of the external tools the engine shells out to. Bare names are
/// resolved through `PATH`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_ytdlp")]
    pub ytdlp: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            ytdlp: default_ytdlp(),
        }
    }
}

impl ToolsConfig {
    /// The presence checks a runner should perform before a batch starts.
    pub fn checks(&self) -> Vec<ToolCheck> {
        vec![
            ToolCheck::new(&self.ffmpeg, "-version"),
            ToolCheck::new(&self.ffprobe, "-version"),
            ToolCheck::new(&self.ytdlp, "--version"),
        ]
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ytdlp() -> PathBuf {
    PathBuf::from("yt-dlp")
}
