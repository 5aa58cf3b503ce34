//! Job data model: the immutable description of one unit of external work.

mod types;

pub use types::{BatchId, GroupId, JobCommand, JobId, JobSpec, JobState, ProgressSource};
