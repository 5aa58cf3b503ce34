//! Per-batch control task and the handles that talk to it.
//!
//! All mutable batch state lives inside [`BatchTask`], which runs as one
//! spawned task. Runners and callers reach it only through channels, so
//! no lock is ever taken on queue or progress state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::job::{BatchId, JobId, JobSpec, JobState};
use crate::runner::{CancelHandle, JobLauncher, JobOutcome};

use super::progress::{GroupUpdate, ProgressBook};
use super::types::{BatchEvent, BatchSummary, ConcurrencyMode, SchedulerError};

#[derive(Debug)]
enum BatchCommand {
    AddJobs(Vec<JobSpec>),
    CancelJob(JobId),
    CancelAll,
    SetMode(ConcurrencyMode),
}

struct RunnerMsg {
    job_id: JobId,
    kind: RunnerMsgKind,
}

enum RunnerMsgKind {
    Progress(f32),
    Terminal(JobOutcome),
}

/// Owning handle for a submitted batch. Dropping it does not cancel the
/// batch; the control task runs to completion on its own.
pub struct BatchHandle {
    batch_id: BatchId,
    cmd_tx: mpsc::UnboundedSender<BatchCommand>,
    done: oneshot::Receiver<BatchSummary>,
}

impl BatchHandle {
    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Appends jobs to the back of the queue of a running batch.
    pub fn add_jobs(&self, jobs: Vec<JobSpec>) -> Result<(), SchedulerError> {
        self.cmd_tx
            .send(BatchCommand::AddJobs(jobs))
            .map_err(|_| SchedulerError::BatchClosed)
    }

    /// Requests cancellation of one job. A no-op for unknown or already
    /// terminal jobs, and after the batch has completed.
    pub fn cancel_job(&self, id: &JobId) {
        let _ = self.cmd_tx.send(BatchCommand::CancelJob(id.clone()));
    }

    /// Requests cancellation of every pending and running job. Idempotent;
    /// a no-op after the batch has completed.
    pub fn cancel_all(&self) {
        let _ = self.cmd_tx.send(BatchCommand::CancelAll);
    }

    /// Switches the concurrency mode. Takes effect the next time a job
    /// slot is filled; running jobs are never interrupted by a downgrade.
    pub fn set_mode(&self, mode: ConcurrencyMode) -> Result<(), SchedulerError> {
        self.cmd_tx
            .send(BatchCommand::SetMode(mode))
            .map_err(|_| SchedulerError::BatchClosed)
    }

    /// A cloneable cancellation-only handle, e.g. for a signal handler.
    pub fn controller(&self) -> BatchController {
        BatchController {
            batch_id: self.batch_id.clone(),
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Waits for the batch to finish and returns its summary.
    pub async fn wait(self) -> Result<BatchSummary, SchedulerError> {
        self.done.await.map_err(|_| SchedulerError::BatchClosed)
    }
}

/// Cancellation-only view of a batch, cheap to clone across tasks.
#[derive(Clone)]
pub struct BatchController {
    batch_id: BatchId,
    cmd_tx: mpsc::UnboundedSender<BatchCommand>,
}

impl BatchController {
    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn cancel_job(&self, id: &JobId) {
        let _ = self.cmd_tx.send(BatchCommand::CancelJob(id.clone()));
    }

    pub fn cancel_all(&self) {
        let _ = self.cmd_tx.send(BatchCommand::CancelAll);
    }
}

pub(super) fn spawn_batch<L: JobLauncher + 'static>(
    batch_id: BatchId,
    launcher: Arc<L>,
    jobs: Vec<JobSpec>,
    mode: ConcurrencyMode,
    events: mpsc::Sender<BatchEvent>,
) -> BatchHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    let handle = BatchHandle {
        batch_id: batch_id.clone(),
        cmd_tx,
        done: done_rx,
    };

    tokio::spawn(async move {
        let (runner_tx, runner_rx) = mpsc::channel(64);
        let mut task = BatchTask {
            batch_id,
            launcher,
            book: ProgressBook::new(),
            queue: VecDeque::new(),
            active: HashMap::new(),
            failures: HashMap::new(),
            mode,
            cancelling: false,
            events,
            runner_tx,
            runner_rx,
            cmd_rx,
        };
        task.enqueue(jobs).await;
        let summary = task.run().await;
        let _ = done_tx.send(summary);
    });

    handle
}

struct BatchTask<L: JobLauncher + 'static> {
    batch_id: BatchId,
    launcher: Arc<L>,
    book: ProgressBook,
    queue: VecDeque<JobSpec>,
    active: HashMap<JobId, CancelHandle>,
    failures: HashMap<JobId, String>,
    mode: ConcurrencyMode,
    cancelling: bool,
    events: mpsc::Sender<BatchEvent>,
    runner_tx: mpsc::Sender<RunnerMsg>,
    runner_rx: mpsc::Receiver<RunnerMsg>,
    cmd_rx: mpsc::UnboundedReceiver<BatchCommand>,
}

impl<L: JobLauncher + 'static> BatchTask<L> {
    async fn run(&mut self) -> BatchSummary {
        let started_at = Utc::now();
        info!(batch = %self.batch_id, "batch started");

        loop {
            self.fill_slots().await;
            if self.queue.is_empty() && self.active.is_empty() {
                break;
            }

            tokio::select! {
                Some(cmd) = self.cmd_rx.recv() => self.handle_command(cmd).await,
                Some(msg) = self.runner_rx.recv() => self.handle_runner_msg(msg).await,
            }
        }

        let job_states = self.book.job_states();
        let count = |s: JobState| job_states.values().filter(|st| **st == s).count();
        let summary = BatchSummary {
            batch_id: self.batch_id.clone(),
            total: job_states.len(),
            done: count(JobState::Done),
            errored: count(JobState::Error),
            cancelled: count(JobState::Cancelled),
            job_states,
            failures: self.failures.clone(),
            groups: self.book.group_reports(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            batch = %self.batch_id,
            done = summary.done,
            errored = summary.errored,
            cancelled = summary.cancelled,
            "batch complete"
        );
        self.send(BatchEvent::BatchComplete {
            summary: summary.clone(),
        })
        .await;
        summary
    }

    /// Registers new jobs at the back of the queue. After a cancel-all
    /// they go straight to `Cancelled` instead of waiting forever.
    async fn enqueue(&mut self, jobs: Vec<JobSpec>) {
        for spec in jobs {
            if !self.book.register(&spec) {
                warn!(batch = %self.batch_id, job = %spec.id, "ignoring duplicate job id");
                continue;
            }
            if self.cancelling {
                self.finish_cancelled(&spec.id).await;
            } else {
                self.queue.push_back(spec);
            }
        }
    }

    /// Starts queued jobs until the concurrency cap is reached.
    async fn fill_slots(&mut self) {
        if self.cancelling {
            return;
        }
        let cap = self.mode.effective_max_parallel();
        while self.active.len() < cap {
            let Some(spec) = self.queue.pop_front() else {
                break;
            };
            self.start_job(spec).await;
        }
    }

    async fn start_job(&mut self, spec: JobSpec) {
        debug!(batch = %self.batch_id, job = %spec.id, label = %spec.label, "starting job");

        let cancel = CancelHandle::new();
        self.active.insert(spec.id.clone(), cancel.clone());

        let group_update = self.book.mark_running(&spec.id);
        self.send(BatchEvent::JobStarted {
            job_id: spec.id.clone(),
            label: spec.label.clone(),
            at: Utc::now(),
        })
        .await;
        self.send_group_update(group_update).await;

        let launcher = Arc::clone(&self.launcher);
        let runner_tx = self.runner_tx.clone();
        let signal = cancel.signal();
        tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::channel::<f32>(16);

            let forwarder = {
                let runner_tx = runner_tx.clone();
                let job_id = spec.id.clone();
                tokio::spawn(async move {
                    while let Some(percent) = progress_rx.recv().await {
                        let msg = RunnerMsg {
                            job_id: job_id.clone(),
                            kind: RunnerMsgKind::Progress(percent),
                        };
                        if runner_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                })
            };

            let outcome = launcher.launch(&spec, progress_tx, signal).await;

            // Drain the forwarder first so every progress message is
            // delivered before the terminal one.
            let _ = forwarder.await;
            let _ = runner_tx
                .send(RunnerMsg {
                    job_id: spec.id,
                    kind: RunnerMsgKind::Terminal(outcome),
                })
                .await;
        });
    }

    async fn handle_command(&mut self, cmd: BatchCommand) {
        match cmd {
            BatchCommand::AddJobs(jobs) => self.enqueue(jobs).await,
            BatchCommand::CancelJob(id) => self.cancel_one(&id).await,
            BatchCommand::CancelAll => self.cancel_all().await,
            BatchCommand::SetMode(mode) => {
                debug!(batch = %self.batch_id, ?mode, "concurrency mode changed");
                self.mode = mode;
            }
        }
    }

    async fn cancel_one(&mut self, id: &JobId) {
        match self.book.state_of(id) {
            Some(JobState::Pending) => {
                self.queue.retain(|spec| spec.id != *id);
                self.finish_cancelled(id).await;
            }
            Some(JobState::Running) => {
                if let Some(cancel) = self.active.get(id) {
                    cancel.cancel();
                }
            }
            // Unknown or already terminal.
            _ => {}
        }
    }

    async fn cancel_all(&mut self) {
        if self.cancelling {
            return;
        }
        self.cancelling = true;
        info!(batch = %self.batch_id, "cancelling batch");

        let pending: Vec<JobId> = self.queue.drain(..).map(|spec| spec.id).collect();
        for id in pending {
            self.finish_cancelled(&id).await;
        }
        for cancel in self.active.values() {
            cancel.cancel();
        }
    }

    /// Terminal path for a job that never ran.
    async fn finish_cancelled(&mut self, id: &JobId) {
        let group_update = self.book.mark_terminal(id, JobState::Cancelled);
        self.send_group_update(group_update).await;
        self.send(BatchEvent::JobTerminal {
            job_id: id.clone(),
            state: JobState::Cancelled,
            detail: None,
            at: Utc::now(),
        })
        .await;
        self.send_overall();
    }

    async fn handle_runner_msg(&mut self, msg: RunnerMsg) {
        match msg.kind {
            RunnerMsgKind::Progress(percent) => {
                if let Some(effective) = self.book.record_progress(&msg.job_id, percent) {
                    // Progress is lossy under backpressure; terminal events
                    // never are.
                    let _ = self.events.try_send(BatchEvent::JobProgress {
                        job_id: msg.job_id.clone(),
                        percent: effective,
                    });
                    self.send_overall();
                }
            }
            RunnerMsgKind::Terminal(outcome) => {
                self.active.remove(&msg.job_id);

                let (state, detail) = match outcome {
                    JobOutcome::Finished { output_path } => {
                        if let Some(path) = output_path {
                            debug!(job = %msg.job_id, "wrote {}", path.display());
                        }
                        (JobState::Done, None)
                    }
                    JobOutcome::Failed { message } => {
                        warn!(job = %msg.job_id, "job failed: {}", message);
                        self.failures.insert(msg.job_id.clone(), message.clone());
                        (JobState::Error, Some(message))
                    }
                    JobOutcome::Cancelled => (JobState::Cancelled, None),
                };

                let group_update = self.book.mark_terminal(&msg.job_id, state);
                self.send_group_update(group_update).await;
                self.send(BatchEvent::JobTerminal {
                    job_id: msg.job_id,
                    state,
                    detail,
                    at: Utc::now(),
                })
                .await;
                self.send_overall();
            }
        }
    }

    async fn send(&self, event: BatchEvent) {
        // A dropped subscriber must not stall the batch.
        let _ = self.events.send(event).await;
    }

    async fn send_group_update(&self, update: Option<GroupUpdate>) {
        if let Some(update) = update {
            self.send(BatchEvent::GroupStatusChanged {
                group_id: update.group_id,
                status: update.status,
                completed: update.completed,
                total: update.total,
            })
            .await;
        }
    }

    fn send_overall(&self) {
        let _ = self.events.try_send(BatchEvent::OverallProgress {
            percent: self.book.overall(),
        });
    }
}
