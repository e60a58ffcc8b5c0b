//! `serve` command: run the freshness driver (spec §4.10, C11) so the
//! index stays up to date as files change, blocking until interrupted.
//!
//! Grounded on the teacher's `cli/commands/serve.rs` shape of "spin up the
//! long-lived watch loop(s) and block"; this crate has no editor-protocol
//! transport to serve (spec §1), so `serve` only runs the watchers.

use crate::config::Settings;
use crate::freshness::{FsWatcher, VcsWatcher};
use crate::index::PersistentIndex;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(index: Arc<PersistentIndex>, settings: Arc<Settings>, workspace_root: PathBuf) {
    println!(
        "smart-index: watching '{}' (cache root: '{}')",
        workspace_root.display(),
        settings.cache_root.display()
    );

    let fs_watcher = FsWatcher::new(Arc::clone(&index), Arc::clone(&settings));
    let fs_root = workspace_root.clone();
    let fs_task = tokio::spawn(async move {
        if let Err(e) = fs_watcher.watch(fs_root).await {
            tracing::error!(error = %e, "file-system watcher exited with an error");
        }
    });

    let vcs_task = settings.version_control.then(|| {
        let vcs_watcher = VcsWatcher::new(Arc::clone(&index), workspace_root.clone());
        tokio::spawn(async move {
            vcs_watcher.watch().await;
        })
    });

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
    println!("shutting down, flushing pending writes...");

    fs_task.abort();
    if let Some(task) = vcs_task {
        task.abort();
    }
    if let Err(e) = index.store().flush().await {
        tracing::warn!(error = %e, "failed to flush pending writes on shutdown");
    }
}
