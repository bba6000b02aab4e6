//! Bounded CPU worker pool (§4.5, §5).
//!
//! Packing computation is CPU-bound and must not block the async runtime's
//! request/IO-handling threads. A fixed number of workers pull jobs off a
//! shared queue; submission enforces a per-task timeout and is cancellation
//! safe (dropping the returned future before it resolves simply leaves the
//! oneshot receiver dropped, the worker's send then no-ops).
//!
//! Grounded on the `PairExecutorRouter`/`ExecutorWorker` split: a router
//! hands work to workers over bounded channels and never mutates state
//! itself. Unlike that per-key router, this pool is a fixed-size N-worker
//! pool since packing jobs have no natural partition key worth isolating on.
//!
//! The pool exposes `submit`/`cancel`/`stats` per §5. Cancellation is
//! cooperative at the queue boundary: a task cancelled before a worker picks
//! it up never runs; a task already executing runs to completion (the
//! packing strategies are pure, fast, in-memory functions with no natural
//! mid-loop yield point to check a flag against). Either way the caller sees
//! `EngineError::Cancelled`, and a timed-out task is treated identically —
//! §5: "Timeouts are translated to cancellation".

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use crate::error::EngineError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Saturation snapshot for monitoring (§5: "stats() for saturation monitoring").
#[derive(Clone, Copy, Debug)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub in_flight: usize,
}

/// A completion handle for a submitted task, returned by `submit_handle`.
/// Cloning the handle lets a caller hold onto `cancel()` independently of
/// awaiting the result.
pub struct TaskHandle<T> {
    result_rx: oneshot::Receiver<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Requests cancellation. A no-op if the task already completed. A task
    /// still queued is skipped entirely; a task already running is left to
    /// finish but its result is discarded in favor of `Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Awaits the result, bounded by `timeout`. Both an explicit `cancel()`
    /// and an elapsed timeout resolve to `EngineError::Cancelled` (§5).
    pub async fn wait(mut self, timeout: Duration) -> Result<T, EngineError> {
        match tokio::time::timeout(timeout, &mut self.result_rx).await {
            Ok(Ok(value)) => {
                if self.cancelled.load(Ordering::Acquire) {
                    Err(EngineError::Cancelled)
                } else {
                    Ok(value)
                }
            }
            Ok(Err(_)) => {
                if self.cancelled.load(Ordering::Acquire) {
                    Err(EngineError::Cancelled)
                } else {
                    Err(EngineError::Internal("worker dropped result sender".to_string()))
                }
            }
            Err(_) => {
                self.cancelled.store(true, Ordering::Release);
                Err(EngineError::Cancelled)
            }
        }
    }
}

/// A bounded pool of CPU workers. Cloning shares the same queue and workers.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    worker_count: usize,
    queue_capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawns `size` worker tasks (minimum 1) pulling from a shared bounded
    /// queue of capacity `queue_capacity`.
    pub fn new(size: usize, queue_capacity: usize) -> Self {
        let size = size.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..size {
            let rx = rx.clone();
            tokio::task::spawn_blocking(move || loop {
                let job = {
                    let mut guard = rx.blocking_lock();
                    guard.blocking_recv()
                };
                match job {
                    Some(job) => job(),
                    None => {
                        warn!(worker_id, "worker pool queue closed, worker exiting");
                        break;
                    }
                }
            });
        }

        Self {
            tx,
            worker_count: size,
            queue_capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Saturation snapshot: worker count, queue capacity, and tasks currently
    /// queued or executing.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    /// Submits a synchronous, CPU-bound closure to the pool and returns a
    /// handle the caller can `cancel()` or `wait()` on. If the pool's queue
    /// is closed (all workers gone — should not happen in practice, but the
    /// fallback keeps the caller working rather than wedged), falls back to
    /// running the closure in-thread via `spawn_blocking` directly.
    pub async fn submit_handle<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<T>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_job = cancelled.clone();
        let in_flight = self.in_flight.clone();

        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let job: Job = Box::new(move || {
            in_flight.fetch_sub(1, Ordering::Relaxed);
            if cancelled_job.load(Ordering::Acquire) {
                return;
            }
            let _ = result_tx.send(f());
        });

        if let Err(send_err) = self.tx.send(job).await {
            warn!("worker pool unavailable, falling back to in-thread execution");
            // All workers gone (should not happen in practice). Run the job
            // directly on a blocking thread rather than dropping it, per
            // §4.5's in-thread fallback contract.
            tokio::task::spawn_blocking(send_err.0);
        }

        TaskHandle { result_rx, cancelled }
    }

    /// Convenience wrapper over `submit_handle`/`TaskHandle::wait` for call
    /// sites that have no use for an independently cancellable handle.
    pub async fn submit<F, T>(&self, timeout: Duration, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_handle(f).await.wait(timeout).await
    }
}

/// Runs an async future with the same timeout contract as `submit`, for call
/// sites (e.g. the ML advisory client) that are I/O-bound rather than
/// CPU-bound and so have no business occupying a blocking worker thread.
pub async fn with_timeout<F, T>(label: &str, timeout: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(v) => Ok(v),
        Err(_) => {
            warn!(label, timeout_ms = timeout.as_millis() as u64, "operation timed out");
            Err(EngineError::Timeout(timeout))
        }
    }
}
