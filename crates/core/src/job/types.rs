//! Core job types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier for one job within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the logical source item a job belongs to.
///
/// Many jobs may share a group (e.g. every stream demuxed from one input
/// file); a group may also contain exactly one job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The external invocation a job performs. The core treats this as opaque;
/// collaborators (the CLI planner) decide program and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    /// Executable to run, either an absolute path or a PATH-resolved name.
    pub program: PathBuf,
    /// Arguments, passed through verbatim.
    pub args: Vec<String>,
}

impl JobCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// How the runner derives fractional progress from the tool's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressSource {
    /// No mid-run progress; reported only at 0% and 100%.
    Indeterminate,
    /// Elapsed media time (`out_time_ms=` / `time=HH:MM:SS.ss` markers)
    /// against an expected total duration in seconds. A non-positive
    /// duration behaves like `Indeterminate`.
    MediaTime { duration_secs: f64 },
    /// Literal `NN%` / `NN.N%` markers in output lines (bytes-ratio
    /// progress as printed by download tools).
    PercentMarkers,
}

/// Immutable description of one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique within the lifetime of one batch.
    pub id: JobId,
    /// Human-readable tag used in events and logs.
    pub label: String,
    /// The external invocation to perform.
    pub command: JobCommand,
    /// How to interpret the tool's output for progress reporting.
    pub progress: ProgressSource,
    /// The logical source item this job belongs to.
    pub group_id: GroupId,
    /// Where successful output is expected to land. Used only for
    /// best-effort cleanup of partial artifacts on cancellation.
    pub output_path: Option<PathBuf>,
}

impl JobSpec {
    /// Creates a spec with a fresh id in its own single-member group.
    pub fn new(label: impl Into<String>, command: JobCommand) -> Self {
        Self {
            id: JobId::new(),
            label: label.into(),
            command,
            progress: ProgressSource::Indeterminate,
            group_id: GroupId::new(),
            output_path: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSource) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Run-state of one job instance. `Pending` is initial; `Done`, `Error`
/// and `Cancelled` are terminal. A job never re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
