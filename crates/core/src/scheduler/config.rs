//! Configuration for the scheduler.

use serde::{Deserialize, Serialize};

use super::types::ConcurrencyMode;

/// Configuration for [`Scheduler`](super::Scheduler).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether batches run jobs concurrently by default.
    #[serde(default)]
    pub parallel: bool,

    /// Concurrent job cap when `parallel` is set.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Capacity of the per-batch event channel handed to subscribers.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_parallel() -> usize {
    2
}

fn default_event_buffer() -> usize {
    64
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel: default_max_parallel(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SchedulerConfig {
    /// The concurrency mode these settings describe.
    pub fn mode(&self) -> ConcurrencyMode {
        if self.parallel {
            ConcurrencyMode::Parallel {
                max_parallel: self.max_parallel,
            }
        } else {
            ConcurrencyMode::Sequential
        }
    }
}
