//! Process runner: executes one job's command as an external process and
//! surfaces its lifecycle without blocking the caller.
//!
//! The scheduler talks to runners exclusively through the [`JobLauncher`]
//! trait and asynchronous messages; runners never touch scheduler state.

mod cancel;
mod config;
mod parse;
mod process;
mod traits;

pub use cancel::{CancelHandle, CancelSignal};
pub use config::RunnerConfig;
pub use process::{ProcessRunner, ToolCheck};
pub use traits::{JobLauncher, JobOutcome, LaunchError};
