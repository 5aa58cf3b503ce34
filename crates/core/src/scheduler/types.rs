//! Public types exchanged with the scheduler.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::job::{BatchId, GroupId, JobId, JobSpec, JobState};
use crate::runner::LaunchError;

/// How many jobs of a batch may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One job at a time, in submission order.
    Sequential,
    /// Up to `max_parallel` jobs at a time.
    Parallel { max_parallel: usize },
}

impl ConcurrencyMode {
    /// The concurrent-job cap this mode resolves to, clamped to `1..=16`.
    pub fn effective_max_parallel(&self) -> usize {
        match self {
            ConcurrencyMode::Sequential => 1,
            ConcurrencyMode::Parallel { max_parallel } => (*max_parallel).clamp(1, 16),
        }
    }
}

/// A batch of jobs handed to [`Scheduler::submit`](super::Scheduler::submit).
#[derive(Debug)]
pub struct BatchRequest {
    pub jobs: Vec<JobSpec>,
    pub mode: ConcurrencyMode,
}

impl BatchRequest {
    pub fn new(jobs: Vec<JobSpec>, mode: ConcurrencyMode) -> Self {
        Self { jobs, mode }
    }

    pub fn sequential(jobs: Vec<JobSpec>) -> Self {
        Self::new(jobs, ConcurrencyMode::Sequential)
    }
}

/// Aggregate status of a job group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    Running,
    /// Every member finished successfully.
    Done,
    /// All members settled without errors, but at least one was cancelled.
    Cancelled,
    Error,
}

/// Per-group slice of a batch summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub status: GroupStatus,
    /// Members that finished successfully.
    pub completed: usize,
    pub total: usize,
}

/// Events emitted over a batch's event channel, in per-job order: zero or
/// more progress events, then exactly one `JobTerminal`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    JobStarted {
        job_id: JobId,
        label: String,
        at: DateTime<Utc>,
    },
    JobProgress {
        job_id: JobId,
        percent: f32,
    },
    /// Mean progress across every job of the batch.
    OverallProgress {
        percent: f32,
    },
    GroupStatusChanged {
        group_id: GroupId,
        status: GroupStatus,
        completed: usize,
        total: usize,
    },
    JobTerminal {
        job_id: JobId,
        state: JobState,
        /// Failure diagnostic, present only for `Error`.
        detail: Option<String>,
        at: DateTime<Utc>,
    },
    BatchComplete {
        summary: BatchSummary,
    },
}

/// Final accounting for a finished batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total: usize,
    pub done: usize,
    pub errored: usize,
    pub cancelled: usize,
    pub job_states: HashMap<JobId, JobState>,
    pub failures: HashMap<JobId, String>,
    pub groups: HashMap<GroupId, GroupReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Tool(#[from] LaunchError),

    #[error("batch contains no jobs")]
    EmptyBatch,

    #[error("duplicate job id in batch: {0}")]
    DuplicateJob(JobId),

    /// The batch already completed and its control task is gone.
    #[error("batch is no longer accepting commands")]
    BatchClosed,
}
