//! Trait definitions for the runner module.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::job::JobSpec;

use super::cancel::CancelSignal;

/// Errors raised before any job runs.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A required external executable is absent. Surfaced once per batch,
    /// before anything starts.
    #[error("required tool not found: {path}")]
    ToolMissing { path: PathBuf },

    /// Spawning a tool failed for a reason other than absence.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The single terminal outcome of one launched job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Process exited successfully.
    Finished { output_path: Option<PathBuf> },
    /// Process failed; `message` carries the captured diagnostic text.
    Failed { message: String },
    /// Cancellation was requested and the process is gone.
    Cancelled,
}

/// Executes one job's command and reports its lifecycle.
///
/// Implementations must send zero or more progress percentages on
/// `progress` while running and then return exactly one [`JobOutcome`].
/// Progress sends may be dropped under backpressure; outcomes never are.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Checks that every external tool this launcher needs exists.
    /// Called once per batch, before any job starts.
    async fn validate(&self) -> Result<(), LaunchError>;

    /// Runs the job to its terminal outcome, honouring `cancel`.
    async fn launch(
        &self,
        spec: &JobSpec,
        progress: mpsc::Sender<f32>,
        cancel: CancelSignal,
    ) -> JobOutcome;
}
