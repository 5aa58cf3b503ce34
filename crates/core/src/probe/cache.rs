//! Memoizing layer over a [`MediaProber`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::error::ProbeError;
use super::types::{MediaInfo, MediaProber};

/// Caches probe results by path so each file is inspected at most once
/// per batch. Failures are not cached; a retry probes again.
#[derive(Debug)]
pub struct ProbeCache<P: MediaProber> {
    prober: P,
    entries: RwLock<HashMap<PathBuf, Arc<MediaInfo>>>,
}

impl<P: MediaProber> ProbeCache<P> {
    pub fn new(prober: P) -> Self {
        Self {
            prober,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached info for `path`, probing on first use.
    pub async fn get(&self, path: &Path) -> Result<Arc<MediaInfo>, ProbeError> {
        if let Some(hit) = self.entries.read().await.get(path) {
            debug!("probe cache hit for {}", path.display());
            return Ok(Arc::clone(hit));
        }

        let info = Arc::new(self.prober.probe(path).await?);

        // Two tasks may race to probe the same path; the first insert wins
        // so both see one consistent value.
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::clone(&info));
        Ok(Arc::clone(entry))
    }
}
