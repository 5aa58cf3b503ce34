//! External-process implementation of [`JobLauncher`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::job::JobSpec;

use super::cancel::CancelSignal;
use super::config::RunnerConfig;
use super::parse::ProgressParser;
use super::traits::{JobLauncher, JobOutcome, LaunchError};

/// Sidecar extensions that download/transcode tools leave next to a
/// partially written output.
const SIDECAR_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp"];

/// One executable the runner depends on, probed during `validate`.
#[derive(Debug, Clone)]
pub struct ToolCheck {
    pub program: PathBuf,
    pub version_arg: String,
}

impl ToolCheck {
    pub fn new(program: impl Into<PathBuf>, version_arg: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            version_arg: version_arg.into(),
        }
    }
}

/// Runs each job's command as a child process, parsing progress out of its
/// combined stdout/stderr line stream.
///
/// Cancellation is cooperative-then-forced: the reader loop stops on the
/// cancel signal, the child gets a grace period to exit, then it is
/// killed. Partial output artifacts are removed best-effort afterwards.
#[derive(Debug)]
pub struct ProcessRunner {
    config: RunnerConfig,
    required_tools: Vec<ToolCheck>,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            required_tools: Vec::new(),
        }
    }

    /// Registers an executable that `validate` must find.
    pub fn with_tool_check(mut self, check: ToolCheck) -> Self {
        self.required_tools.push(check);
        self
    }

    /// Waits out the grace period, then kills the child if it is still
    /// alive, and removes partial outputs.
    async fn shutdown_child(&self, child: &mut Child, spec: &JobSpec) {
        let grace = Duration::from_millis(self.config.grace_period_ms);
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            if let Err(e) = child.start_kill() {
                debug!(job = %spec.id, "kill after grace period failed: {}", e);
            }
            let _ = child.wait().await;
        }
        self.remove_partial_outputs(spec).await;
    }

    /// Best-effort removal of the output artifact and known sidecar files
    /// after a cancellation. Failures are logged, never fatal.
    async fn remove_partial_outputs(&self, spec: &JobSpec) {
        let Some(output) = &spec.output_path else {
            return;
        };

        let mut candidates = vec![output.clone()];
        for ext in SIDECAR_EXTENSIONS {
            let mut name = output.as_os_str().to_owned();
            name.push(format!(".{ext}"));
            candidates.push(PathBuf::from(name));
        }

        for path in candidates {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(job = %spec.id, "removed partial output {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    job = %spec.id,
                    "could not remove partial output {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }
}

/// Per-launch line handling: diagnostic tail plus rate-limited progress.
struct LineSink {
    parser: ProgressParser,
    tail: VecDeque<String>,
    tail_cap: usize,
    progress: mpsc::Sender<f32>,
    interval: Duration,
    last_sent: Instant,
}

impl LineSink {
    fn push(&mut self, line: &str) {
        if self.tail.len() == self.tail_cap {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());

        if let Some(percent) = self.parser.parse_line(line) {
            if self.last_sent.elapsed() >= self.interval || percent >= 100.0 {
                // Dropping a progress update under backpressure is fine;
                // the next one supersedes it.
                let _ = self.progress.try_send(percent);
                self.last_sent = Instant::now();
            }
        }
    }

    fn diagnostic(&self) -> String {
        self.tail
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl JobLauncher for ProcessRunner {
    async fn validate(&self) -> Result<(), LaunchError> {
        for check in &self.required_tools {
            let result = Command::new(&check.program)
                .arg(&check.version_arg)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match result {
                // A runnable tool is enough; version-flag exit codes vary.
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(LaunchError::ToolMissing {
                        path: check.program.clone(),
                    });
                }
                Err(e) => {
                    return Err(LaunchError::Spawn {
                        program: check.program.clone(),
                        source: e,
                    });
                }
            }
        }
        Ok(())
    }

    async fn launch(
        &self,
        spec: &JobSpec,
        progress: mpsc::Sender<f32>,
        cancel: CancelSignal,
    ) -> JobOutcome {
        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        let mut child = match Command::new(&spec.command.program)
            .args(&spec.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return JobOutcome::Failed {
                    message: format!("tool not found: {}", spec.command.program.display()),
                };
            }
            Err(e) => {
                return JobOutcome::Failed {
                    message: format!(
                        "failed to spawn {}: {}",
                        spec.command.program.display(),
                        e
                    ),
                };
            }
        };

        debug!(job = %spec.id, "started {}", spec.command.program.display());

        let stdout = child.stdout.take().expect("stdout should be captured");
        let stderr = child.stderr.take().expect("stderr should be captured");
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();

        let interval = Duration::from_millis(self.config.progress_interval_ms);
        let mut sink = LineSink {
            parser: ProgressParser::new(&spec.progress),
            tail: VecDeque::new(),
            tail_cap: self.config.diagnostic_tail_lines.max(1),
            progress: progress.clone(),
            interval,
            // Back-dated so the first parsed line reports immediately.
            last_sent: Instant::now()
                .checked_sub(interval)
                .unwrap_or_else(Instant::now),
        };

        let _ = progress.try_send(0.0);

        let mut out_done = false;
        let mut err_done = false;
        let mut was_cancelled = false;

        while !(out_done && err_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    was_cancelled = true;
                    break;
                }
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(l)) => sink.push(&l),
                    _ => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(l)) => sink.push(&l),
                    _ => err_done = true,
                },
            }
        }

        if was_cancelled {
            self.shutdown_child(&mut child, spec).await;
            return JobOutcome::Cancelled;
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return JobOutcome::Failed {
                    message: format!("failed waiting for process exit: {}", e),
                };
            }
        };

        // A cancel that raced with a natural exit still reports Cancelled;
        // the scheduler already counts the job as going away.
        if cancel.is_cancelled() {
            self.remove_partial_outputs(spec).await;
            return JobOutcome::Cancelled;
        }

        if status.success() {
            let _ = progress.try_send(100.0);
            JobOutcome::Finished {
                output_path: spec.output_path.clone(),
            }
        } else {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let diagnostic = sink.diagnostic();
            let message = if diagnostic.is_empty() {
                format!("process exited with code {}", code)
            } else {
                format!("process exited with code {}: {}", code, diagnostic)
            };
            JobOutcome::Failed { message }
        }
    }
}
