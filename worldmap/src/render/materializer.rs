//! Background worker pool for CPU-bound raster work.
//!
//! Region loads, crops and resamples run on a small rayon pool. Each job
//! hands back a [`TaskHandle`] that the render thread polls once per frame
//! without ever blocking. Dropping or cancelling a handle cancels the job;
//! a job that finishes after cancellation has its result discarded.
//!
//! ```text
//!   render thread                         tile-worker-N
//!   ─────────────                         ─────────────
//!   spawn(job) ──────────────────────────► token cancelled? ── yes ──► skipped
//!      │                                      │ no
//!   TaskHandle::poll()  ◄── oneshot ───── job(&token)
//!      Pending / Ready / Lost                 │
//!                                          token cancelled or handle gone? ──► discarded
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::RenderError;

/// Result of polling a [`TaskHandle`].
#[derive(Debug)]
pub enum TaskPoll<T> {
    /// Still running or queued.
    Pending,
    /// Finished; the value has been taken out of the handle.
    Ready(T),
    /// The job ended without a result (panicked, skipped or already taken).
    Lost,
}

/// Cancellable handle to a job running on the worker pool.
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: &'static str,
    rx: oneshot::Receiver<T>,
    token: CancellationToken,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Non-blocking check for the job's result.
    pub fn poll(&mut self) -> TaskPoll<T> {
        if self.token.is_cancelled() {
            return TaskPoll::Lost;
        }
        match self.rx.try_recv() {
            Ok(value) => TaskPoll::Ready(value),
            Err(TryRecvError::Empty) => TaskPoll::Pending,
            Err(TryRecvError::Closed) => TaskPoll::Lost,
        }
    }

    /// Cancel the job. Any result it produces later is discarded.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Default)]
struct MaterializerCounters {
    spawned: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time worker pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaterializerStats {
    pub spawned: u64,
    /// Jobs whose result reached a live handle.
    pub completed: u64,
    /// Jobs cancelled before they started.
    pub skipped: u64,
    /// Jobs that finished after their handle was cancelled or dropped.
    pub discarded: u64,
    pub panicked: u64,
    pub in_flight: u64,
}

/// Worker pool producing region rasters and scaled crops.
pub struct Materializer {
    pool: rayon::ThreadPool,
    threads: usize,
    counters: Arc<MaterializerCounters>,
}

impl Materializer {
    /// Pool with `threads` named workers (`tile-worker-{n}`).
    pub fn new(threads: usize) -> Result<Self, RenderError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tile-worker-{}", i))
            .build()?;
        debug!(threads, "Started tile worker pool");
        Ok(Self {
            pool,
            threads,
            counters: Arc::new(MaterializerCounters::default()),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue a job. The job receives the handle's cancellation token and
    /// may check it during long work.
    pub fn spawn<T, F>(&self, label: &'static str, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let counters = Arc::clone(&self.counters);

        counters.spawned.fetch_add(1, Ordering::Relaxed);
        counters.in_flight.fetch_add(1, Ordering::AcqRel);

        self.pool.spawn(move || {
            if worker_token.is_cancelled() {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                trace!(task = label, "Skipped cancelled task");
            } else {
                match panic::catch_unwind(AssertUnwindSafe(|| job(&worker_token))) {
                    Ok(value) => {
                        if worker_token.is_cancelled() || tx.send(value).is_err() {
                            counters.discarded.fetch_add(1, Ordering::Relaxed);
                            debug!(task = label, "Discarded result of cancelled task");
                        } else {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(_) => {
                        counters.panicked.fetch_add(1, Ordering::Relaxed);
                        warn!(task = label, "Tile worker task panicked");
                    }
                }
            }
            counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        });

        TaskHandle { label, rx, token }
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> u64 {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Sleep-poll until no job is in flight. Returns false on timeout.
    ///
    /// For tools and tests; the render loop never waits.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn stats(&self) -> MaterializerStats {
        let c = &self.counters;
        MaterializerStats {
            spawned: c.spawned.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
            in_flight: c.in_flight.load(Ordering::Relaxed),
        }
    }
}
