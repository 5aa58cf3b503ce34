//! Scriptable in-memory [`JobLauncher`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::job::{JobId, JobSpec};
use crate::runner::{CancelSignal, JobLauncher, JobOutcome, LaunchError};

/// What a mock launch should do for one job.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Report each step after `step_delay`, then finish.
    Succeed {
        progress_steps: Vec<f32>,
        step_delay: Duration,
    },
    /// Fail with `message` after `after`.
    Fail { message: String, after: Duration },
    /// Block until the cancel signal fires.
    RunUntilCancelled,
}

impl MockBehavior {
    pub fn succeed() -> Self {
        Self::Succeed {
            progress_steps: vec![50.0],
            step_delay: Duration::from_millis(1),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            message: message.into(),
            after: Duration::from_millis(1),
        }
    }
}

/// Launcher whose behaviour is scripted per job id. Records launch order
/// and the high-water mark of concurrently running jobs.
#[derive(Clone, Default)]
pub struct MockLauncher {
    behaviors: Arc<RwLock<HashMap<JobId, MockBehavior>>>,
    default_behavior: Arc<RwLock<Option<MockBehavior>>>,
    launches: Arc<RwLock<Vec<JobId>>>,
    running: Arc<AtomicUsize>,
    high_water: Arc<AtomicUsize>,
    validate_error: Arc<Mutex<Option<LaunchError>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_behavior(&self, id: &JobId, behavior: MockBehavior) {
        self.behaviors.write().await.insert(id.clone(), behavior);
    }

    pub async fn set_default_behavior(&self, behavior: MockBehavior) {
        *self.default_behavior.write().await = Some(behavior);
    }

    /// Makes the next `validate` call fail with `error`.
    pub async fn set_validate_error(&self, error: LaunchError) {
        *self.validate_error.lock().await = Some(error);
    }

    pub async fn launch_order(&self) -> Vec<JobId> {
        self.launches.read().await.clone()
    }

    pub async fn launch_count(&self) -> usize {
        self.launches.read().await.len()
    }

    /// The most jobs ever running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    async fn behavior_for(&self, id: &JobId) -> MockBehavior {
        if let Some(behavior) = self.behaviors.read().await.get(id) {
            return behavior.clone();
        }
        self.default_behavior
            .read()
            .await
            .clone()
            .unwrap_or_else(MockBehavior::succeed)
    }
}

/// Sleeps for `delay`, returning `true` if cancellation fired first.
async fn cancelled_within(delay: Duration, cancel: &CancelSignal) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[async_trait]
impl JobLauncher for MockLauncher {
    async fn validate(&self) -> Result<(), LaunchError> {
        match self.validate_error.lock().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn launch(
        &self,
        spec: &JobSpec,
        progress: mpsc::Sender<f32>,
        cancel: CancelSignal,
    ) -> JobOutcome {
        self.launches.write().await.push(spec.id.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        let behavior = self.behavior_for(&spec.id).await;
        let outcome = match behavior {
            MockBehavior::Succeed {
                progress_steps,
                step_delay,
            } => {
                let mut cancelled = false;
                for step in progress_steps {
                    if cancelled_within(step_delay, &cancel).await {
                        cancelled = true;
                        break;
                    }
                    let _ = progress.send(step).await;
                }
                if cancelled {
                    JobOutcome::Cancelled
                } else {
                    JobOutcome::Finished {
                        output_path: spec.output_path.clone(),
                    }
                }
            }
            MockBehavior::Fail { message, after } => {
                if cancelled_within(after, &cancel).await {
                    JobOutcome::Cancelled
                } else {
                    JobOutcome::Failed { message }
                }
            }
            MockBehavior::RunUntilCancelled => {
                cancel.cancelled().await;
                JobOutcome::Cancelled
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
