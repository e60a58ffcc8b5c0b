//! Sharded persistence layer (spec §4.4, C5).
//!
//! On-disk layout: `<cache>/index/<h[0..2]>/<h[2..4]>/<h>.bin`, a two-level
//! hex fan-out of the URI's digest so no single directory holds more than
//! roughly 1 024 entries for a typical workspace (spec §4.4). Writes land
//! via write-to-temp-then-rename, the same atomic-replace idiom the
//! teacher's persistence layer uses for its single combined index file.
//!
//! Concurrency: one `tokio::sync::Mutex` per URI, looked up through a
//! `DashMap`. The `Arc`'s strong count doubles as the waiter count from
//! spec §4.4's "reference counter per URI": when a lock's `Arc` count drops
//! to 1 (only the map holds it), the entry is removed so the map does not
//! grow without bound under bursty editing.

use crate::error::{IndexError, IndexResult};
use crate::model::{FileShard, Uri};
use crate::shard::codec;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Map size above which zero-waiter lock entries are swept (spec §4.4, §5).
const LOCK_TABLE_HIGH_WATER_MARK: usize = 10_000;

/// Number of buffered writes above which `write` forces a synchronous flush
/// of the oldest pending entries (spec §4.4 backpressure).
const PENDING_WRITE_CEILING: usize = 100;

fn uri_digest(uri: &Uri) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Pending, not-yet-durable write state for the coalescing buffer.
struct PendingWrite {
    shard: FileShard,
}

pub struct ShardStore {
    cache_root: PathBuf,
    locks: DashMap<Uri, Arc<AsyncMutex<()>>>,
    pending: DashMap<Uri, PendingWrite>,
    pending_order: SyncMutex<VecDeque<Uri>>,
    pending_count: AtomicUsize,
    coalesce_window: Duration,
    coalescing_enabled: bool,
}

impl ShardStore {
    pub fn new(cache_root: PathBuf, coalesce_window: Duration) -> Arc<Self> {
        Arc::new(Self {
            cache_root,
            locks: DashMap::new(),
            pending: DashMap::new(),
            pending_order: SyncMutex::new(VecDeque::new()),
            pending_count: AtomicUsize::new(0),
            coalesce_window,
            coalescing_enabled: true,
        })
    }

    /// A store with write coalescing disabled; every `write` is durable
    /// immediately. Useful for tests and for the one-shot CLI `index`
    /// command, where there is no subsequent editor session to batch with.
    pub fn new_uncoalesced(cache_root: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            cache_root,
            locks: DashMap::new(),
            pending: DashMap::new(),
            pending_order: SyncMutex::new(VecDeque::new()),
            pending_count: AtomicUsize::new(0),
            coalesce_window: Duration::ZERO,
            coalescing_enabled: false,
        })
    }

    fn shard_path(&self, uri: &Uri) -> PathBuf {
        let h = uri_digest(uri);
        self.cache_root
            .join("index")
            .join(&h[0..2])
            .join(&h[2..4])
            .join(format!("{h}.bin"))
    }

    async fn acquire(self: &Arc<Self>, uri: &Uri) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(uri.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the map's own reference to `uri`'s lock once nothing else holds
    /// it. The strong-count test and the removal must happen as one atomic
    /// step under DashMap's shard lock (`remove_if`) — checking the count
    /// via a separate read guard and only then removing leaves a window
    /// where a concurrent `acquire` clones the same `Arc` in between,
    /// and the removal then deletes the map slot out from under it, so the
    /// next `acquire` for that uri mints a second, distinct mutex and two
    /// writers serialize against different locks instead of the same one.
    fn release(self: &Arc<Self>, uri: &Uri) {
        self.locks.remove_if(uri, |_, arc| Arc::strong_count(arc) == 1);
        if self.locks.len() > LOCK_TABLE_HIGH_WATER_MARK {
            self.sweep_zero_waiter_locks();
        }
    }

    fn sweep_zero_waiter_locks(self: &Arc<Self>) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Read a shard without taking the per-URI lock. Only safe to call from
    /// inside a `with_lock` body (spec §4.4 lock-skipping discipline) or
    /// when the caller has some other guarantee of exclusivity (bulk-index
    /// Phase 2's read-only scan).
    pub async fn read_no_lock(&self, uri: &Uri) -> IndexResult<Option<FileShard>> {
        if let Some(pending) = self.pending.get(uri) {
            return Ok(Some(pending.shard.clone()));
        }
        let path = self.shard_path(uri);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IndexError::FileRead {
                    path,
                    source: e,
                })
            }
        };
        codec::decode(uri, &bytes).map(Some)
    }

    /// Durably persist `shard` without taking the per-URI lock.
    pub async fn write_no_lock(&self, shard: FileShard) -> IndexResult<()> {
        let path = self.shard_path(&shard.uri);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::FileWrite {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        let bytes = codec::encode(&shard)?;
        let temp_path = path.with_extension("bin.tmp");
        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| IndexError::FileWrite {
                path: temp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| IndexError::FileWrite {
                path: path.clone(),
                source: e,
            })?;
        Ok(())
    }

    /// Remove a shard without taking the per-URI lock. Idempotent.
    pub async fn remove_no_lock(&self, uri: &Uri) -> IndexResult<()> {
        self.pending.remove(uri);
        let path = self.shard_path(uri);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::FileWrite { path, source: e }),
        }
    }

    /// Read the stored shard, or `None` if absent.
    pub async fn read(self: &Arc<Self>, uri: &Uri) -> IndexResult<Option<FileShard>> {
        self.with_lock(uri, |store| {
            let uri = uri.clone();
            async move { store.read_no_lock(&uri).await }
        })
        .await
    }

    /// Durably (or, if coalescing is enabled, eventually) persist `shard`.
    pub async fn write(self: &Arc<Self>, shard: FileShard) -> IndexResult<()> {
        if !self.coalescing_enabled {
            return self
                .with_lock(&shard.uri.clone(), |store| {
                    let shard = shard.clone();
                    async move { store.write_no_lock(shard).await }
                })
                .await;
        }

        let uri = shard.uri.clone();
        let was_new = self.pending.insert(uri.clone(), PendingWrite { shard }).is_none();
        if was_new {
            self.pending_order.lock().push_back(uri.clone());
            let count = self.pending_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count > PENDING_WRITE_CEILING {
                self.force_flush_oldest().await?;
            } else {
                self.schedule_flush(uri);
            }
        }
        Ok(())
    }

    fn schedule_flush(self: &Arc<Self>, uri: Uri) {
        let store = Arc::clone(self);
        let window = self.coalesce_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = store.flush_one(&uri).await;
        });
    }

    async fn flush_one(self: &Arc<Self>, uri: &Uri) -> IndexResult<()> {
        let Some((_, pending)) = self.pending.remove(uri) else {
            return Ok(());
        };
        self.pending_order.lock().retain(|u| u != uri);
        self.pending_count.fetch_sub(1, Ordering::SeqCst);
        self.with_lock(uri, |store| {
            let shard = pending.shard.clone();
            async move { store.write_no_lock(shard).await }
        })
        .await
    }

    async fn force_flush_oldest(self: &Arc<Self>) -> IndexResult<()> {
        while self.pending_count.load(Ordering::SeqCst) > PENDING_WRITE_CEILING / 2 {
            let oldest = self.pending_order.lock().pop_front();
            let Some(uri) = oldest else { break };
            self.flush_one(&uri).await?;
        }
        Ok(())
    }

    /// Wait until every buffered write has been made durable (spec §4.4
    /// `flush()`; called on shutdown to bound data loss to zero).
    pub async fn flush(self: &Arc<Self>) -> IndexResult<()> {
        let uris: Vec<Uri> = self.pending_order.lock().iter().cloned().collect();
        for uri in uris {
            self.flush_one(&uri).await?;
        }
        Ok(())
    }

    /// Remove a shard if present.
    pub async fn remove(self: &Arc<Self>, uri: &Uri) -> IndexResult<()> {
        self.with_lock(uri, |store| {
            let uri = uri.clone();
            async move { store.remove_no_lock(&uri).await }
        })
        .await
    }

    /// Walk the on-disk hash fan-out and decode every shard found there.
    /// Used once at startup to rehydrate the in-memory indices from a prior
    /// process's persisted state (spec §8 "restart equivalence"); the shard
    /// body carries its own `uri`, so the directory layout need not be
    /// reversed to recover it.
    pub async fn scan_all(&self) -> IndexResult<Vec<FileShard>> {
        let root = self.cache_root.join("index");
        let mut shards = Vec::new();
        let mut dirs = match tokio::fs::read_dir(&root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(shards),
            Err(e) => return Err(IndexError::FileRead { path: root, source: e }),
        };
        let mut level1 = Vec::new();
        while let Some(entry) = dirs.next_entry().await.map_err(|e| IndexError::FileRead {
            path: root.clone(),
            source: e,
        })? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                level1.push(entry.path());
            }
        }
        for dir1 in level1 {
            let mut sub = match tokio::fs::read_dir(&dir1).await {
                Ok(rd) => rd,
                Err(_) => continue,
            };
            let mut level2 = Vec::new();
            while let Ok(Some(entry)) = sub.next_entry().await {
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    level2.push(entry.path());
                }
            }
            for dir2 in level2 {
                let mut files = match tokio::fs::read_dir(&dir2).await {
                    Ok(rd) => rd,
                    Err(_) => continue,
                };
                while let Ok(Some(entry)) = files.next_entry().await {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                        continue;
                    }
                    let bytes = match tokio::fs::read(&path).await {
                        Ok(b) => b,
                        Err(_) => continue,
                    };
                    // The uri stored inside the shard is authoritative; only
                    // used to satisfy `codec::decode`'s error-context arg.
                    match codec::decode(&path.display().to_string(), &bytes) {
                        Ok(shard) => shards.push(shard),
                        Err(e) => tracing::warn!(path = %path.display(), error = %e, "dropping unreadable shard during startup scan"),
                    }
                }
            }
        }
        Ok(shards)
    }

    /// Run `f` under an exclusive per-URI lock. `f` receives `&Self` so it
    /// can call `read_no_lock`/`write_no_lock`/`remove_no_lock` on the same
    /// URI without re-entering this lock (spec §4.4 lock-skipping
    /// discipline; calling `read`/`write`/`remove` from inside `f` for the
    /// *same* URI would deadlock and is a defect, not a condition this type
    /// guards against at runtime).
    pub async fn with_lock<F, Fut, T>(self: &Arc<Self>, uri: &Uri, f: F) -> IndexResult<T>
    where
        F: FnOnce(&Arc<Self>) -> Fut,
        Fut: Future<Output = IndexResult<T>>,
    {
        let lock = self.acquire(uri).await;
        let result = {
            let _guard = lock.lock().await;
            f(self).await
        };
        // Drop our clone before checking the strong count so `release` sees
        // only the map's own reference when we are the sole holder.
        drop(lock);
        self.release(uri);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileShard;

    fn sample(uri: &str) -> FileShard {
        FileShard::new(uri.to_string(), "hash".to_string(), 1, 1)
    }

    #[tokio::test]
    async fn write_then_read_round_trips_uncoalesced() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new_uncoalesced(dir.path().to_path_buf());
        store.write(sample("a.ts")).await.unwrap();
        let read = store.read(&"a.ts".to_string()).await.unwrap();
        assert_eq!(read.unwrap().uri, "a.ts");
    }

    #[tokio::test]
    async fn read_of_absent_uri_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new_uncoalesced(dir.path().to_path_buf());
        let read = store.read(&"missing.ts".to_string()).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new_uncoalesced(dir.path().to_path_buf());
        store.write(sample("a.ts")).await.unwrap();
        store.remove(&"a.ts".to_string()).await.unwrap();
        store.remove(&"a.ts".to_string()).await.unwrap();
        assert!(store.read(&"a.ts".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn coalesced_write_is_visible_before_the_flush_fires() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new(dir.path().to_path_buf(), Duration::from_millis(50));
        store.write(sample("a.ts")).await.unwrap();
        // pending, not yet durable: read_no_lock must still see it via the buffer
        let read = store.read(&"a.ts".to_string()).await.unwrap();
        assert!(read.is_some());
    }

    #[tokio::test]
    async fn flush_waits_for_all_pending_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new(dir.path().to_path_buf(), Duration::from_millis(500));
        store.write(sample("a.ts")).await.unwrap();
        store.write(sample("b.ts")).await.unwrap();
        store.flush().await.unwrap();
        let path_a = store.shard_path(&"a.ts".to_string());
        assert!(path_a.exists());
    }

    #[tokio::test]
    async fn scan_all_finds_every_persisted_shard() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new_uncoalesced(dir.path().to_path_buf());
        store.write(sample("a.ts")).await.unwrap();
        store.write(sample("b.ts")).await.unwrap();

        let mut uris: Vec<String> = store.scan_all().await.unwrap().into_iter().map(|s| s.uri).collect();
        uris.sort();
        assert_eq!(uris, vec!["a.ts".to_string(), "b.ts".to_string()]);
    }

    #[tokio::test]
    async fn scan_all_on_missing_cache_root_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ShardStore::new_uncoalesced(dir.path().join("does-not-exist"));
        assert!(store.scan_all().await.unwrap().is_empty());
    }
}
