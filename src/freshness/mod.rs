//! Freshness driver (spec §4.10, C11): translates file-system and
//! version-control signals into `ensure_up_to_date` / `update_file` /
//! `remove_file` calls against the persistent index.
//!
//! Grounded on `watcher/unified.rs`'s notify event loop and
//! `watcher/debouncer.rs`'s per-path debounce, generalized here with the
//! additional "await write-finish" stabilization window spec §4.10 asks
//! for (a burst of `Modify` events during a large save should settle
//! before the file is re-extracted, not just the last event in a tight
//! window) and a version-control branch-switch watcher with no teacher
//! counterpart (`discover.rs`'s `ignore`-crate walk is the closest
//! precedent for "ask git what changed").

mod git;
mod watcher;

pub use git::VcsWatcher;
pub use watcher::FsWatcher;

use crate::index::PersistentIndex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Per-path "in-progress" set (spec §4.10): while a path's update is being
/// applied, duplicate signals for the same path are dropped rather than
/// queued, so a watcher burst cannot pile up redundant re-extractions.
#[derive(Default)]
pub struct InProgressSet {
    paths: AsyncMutex<HashSet<PathBuf>>,
}

impl InProgressSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `true` if `path` was not already in progress (and is now
    /// marked as such); `false` if a duplicate signal should be dropped.
    async fn try_enter(&self, path: &PathBuf) -> bool {
        self.paths.lock().await.insert(path.clone())
    }

    async fn leave(&self, path: &PathBuf) {
        self.paths.lock().await.remove(path);
    }
}

/// Apply one freshness signal: re-index `path` through the persistent
/// index, dropping the event if an update for the same path is already
/// in flight.
pub(crate) async fn apply_update(
    index: &Arc<PersistentIndex>,
    in_progress: &Arc<InProgressSet>,
    path: PathBuf,
) {
    if !in_progress.try_enter(&path).await {
        tracing::debug!(path = %path.display(), "freshness update already in progress, dropping duplicate");
        return;
    }
    index.ensure_up_to_date(&[path.clone()], None).await;
    in_progress.leave(&path).await;
}

/// Apply one removal signal.
pub(crate) async fn apply_removal(index: &Arc<PersistentIndex>, uri: &str) {
    if let Err(e) = index.remove_file(&uri.to_string()).await {
        tracing::warn!(uri, error = %e, "freshness driver failed to evict removed file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_progress_set_drops_duplicate_entries() {
        let set = InProgressSet::new();
        let path = PathBuf::from("a.ts");
        assert!(set.try_enter(&path).await);
        assert!(!set.try_enter(&path).await);
        set.leave(&path).await;
        assert!(set.try_enter(&path).await);
    }
}
