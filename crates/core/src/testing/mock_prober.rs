//! Canned-answer [`MediaProber`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::probe::{MediaInfo, MediaProber, ProbeError};

/// Prober serving pre-registered [`MediaInfo`] by path. Unknown paths
/// fail the way a missing file would.
#[derive(Clone, Default)]
pub struct MockProber {
    answers: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    calls: Arc<AtomicUsize>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_info(&self, info: MediaInfo) {
        self.answers.write().await.insert(info.path.clone(), info);
    }

    pub fn probe_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProber for MockProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| ProbeError::ProbeFailed {
                path: path.to_path_buf(),
                reason: "No such file or directory".to_string(),
            })
    }
}
