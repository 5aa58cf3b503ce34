//! Core engine for running batches of media jobs through external tools.
//!
//! The pieces compose in one direction: a [`job::JobSpec`] describes a
//! command, a [`runner::JobLauncher`] executes it, and the
//! [`scheduler::Scheduler`] drives a whole batch with bounded concurrency,
//! progress aggregation and cancellation. [`probe::ProbeCache`] sits in
//! front of ffprobe for callers that plan jobs from media files.

pub mod config;
pub mod job;
pub mod probe;
pub mod runner;
pub mod scheduler;
pub mod testing;

pub use config::{load_config, load_config_from_str, Config, ConfigError, ToolsConfig};
pub use job::{BatchId, GroupId, JobCommand, JobId, JobSpec, JobState, ProgressSource};
pub use probe::{FfprobeProber, MediaInfo, MediaProber, ProbeCache, ProbeError, StreamInfo, StreamKind};
pub use runner::{
    CancelHandle, CancelSignal, JobLauncher, JobOutcome, LaunchError, ProcessRunner, RunnerConfig,
    ToolCheck,
};
pub use scheduler::{
    BatchController, BatchEvent, BatchHandle, BatchRequest, BatchSummary, ConcurrencyMode,
    GroupReport, GroupStatus, Scheduler, SchedulerConfig, SchedulerError,
};
