//! Batch scheduling over a [`JobLauncher`].

mod batch;
mod config;
mod progress;
mod types;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::job::BatchId;
use crate::runner::JobLauncher;

pub use batch::{BatchController, BatchHandle};
pub use config::SchedulerConfig;
pub use types::{
    BatchEvent, BatchRequest, BatchSummary, ConcurrencyMode, GroupReport, GroupStatus,
    SchedulerError,
};

/// Runs batches of jobs over one launcher, with bounded concurrency and
/// cancellation. Each submitted batch gets its own control task; the
/// scheduler itself holds no per-batch state and can be shared freely.
pub struct Scheduler<L: JobLauncher + 'static> {
    launcher: Arc<L>,
}

impl<L: JobLauncher + 'static> Scheduler<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
        }
    }

    /// Validates tooling and starts a batch. Events for the whole batch
    /// lifecycle arrive on `events`; the returned handle controls it.
    ///
    /// Fails fast, before any job starts, when the batch is empty, a job
    /// id repeats, or a required external tool is missing.
    pub async fn submit(
        &self,
        request: BatchRequest,
        events: mpsc::Sender<BatchEvent>,
    ) -> Result<BatchHandle, SchedulerError> {
        if request.jobs.is_empty() {
            return Err(SchedulerError::EmptyBatch);
        }
        let mut seen = HashSet::new();
        for spec in &request.jobs {
            if !seen.insert(spec.id.clone()) {
                return Err(SchedulerError::DuplicateJob(spec.id.clone()));
            }
        }

        self.launcher.validate().await?;

        let batch_id = BatchId::new();
        info!(
            batch = %batch_id,
            jobs = request.jobs.len(),
            max_parallel = request.mode.effective_max_parallel(),
            "submitting batch"
        );

        Ok(batch::spawn_batch(
            batch_id,
            Arc::clone(&self.launcher),
            request.jobs,
            request.mode,
            events,
        ))
    }
}
