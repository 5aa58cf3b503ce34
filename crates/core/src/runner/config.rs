//! Configuration for the process runner.

use serde::{Deserialize, Serialize};

/// Configuration for [`ProcessRunner`](super::ProcessRunner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How long a cancelled process gets to exit on its own before it is
    /// forcibly killed, in milliseconds.
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,

    /// Minimum interval between progress reports for one job, in
    /// milliseconds. Lines arriving faster than this are still parsed but
    /// not re-reported.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// How many trailing output lines to keep as the diagnostic attached
    /// to a failed job.
    #[serde(default = "default_tail_lines")]
    pub diagnostic_tail_lines: usize,
}

fn default_grace_period() -> u64 {
    2000
}

fn default_progress_interval() -> u64 {
    500
}

fn default_tail_lines() -> usize {
    20
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period(),
            progress_interval_ms: default_progress_interval(),
            diagnostic_tail_lines: default_tail_lines(),
        }
    }
}

impl RunnerConfig {
    /// Sets the cancellation grace period.
    pub fn with_grace_period_ms(mut self, ms: u64) -> Self {
        self.grace_period_ms = ms;
        self
    }

    /// Sets the minimum progress reporting interval.
    pub fn with_progress_interval_ms(mut self, ms: u64) -> Self {
        self.progress_interval_ms = ms;
        self
    }
}
