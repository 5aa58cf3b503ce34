use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The ffprobe executable is not on the system.
    #[error("ffprobe not found at {path}")]
    ToolMissing { path: PathBuf },

    /// ffprobe ran but could not inspect the file.
    #[error("failed to probe {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    /// ffprobe produced output we could not interpret.
    #[error("unexpected ffprobe output for {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
