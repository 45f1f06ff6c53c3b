//! Bounded worker pool for per-symbol evaluation tasks.
//!
//! Up to `max_workers` tasks run concurrently; further submissions queue
//! on the semaphore. If the backlog ever exceeds the caller-runs
//! threshold the submitting task runs the work inline, which throttles
//! the scheduler loop itself and preserves liveness.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// How a submission was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// A worker permit was free; the task runs concurrently.
    Spawned,
    /// All workers busy; the task waits in the (unbounded) queue.
    Queued,
    /// Backlog exceeded the threshold; the caller ran the task inline.
    CallerRan,
}

pub struct EvaluationPool {
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    caller_runs_threshold: usize,
}

impl EvaluationPool {
    pub fn new(max_workers: usize, caller_runs_threshold: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            queued: Arc::new(AtomicUsize::new(0)),
            caller_runs_threshold,
        }
    }

    /// Submit a task. Returns how it was scheduled; in the caller-runs
    /// case the future has already completed when this returns.
    pub async fn dispatch<F>(&self, task: F) -> DispatchMode
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            tokio::spawn(async move {
                task.await;
                drop(permit);
            });
            return DispatchMode::Spawned;
        }

        let backlog = self.queued.load(Ordering::SeqCst);
        if backlog >= self.caller_runs_threshold {
            warn!(
                "EvaluationPool: backlog {} at threshold, running task on caller",
                backlog
            );
            task.await;
            return DispatchMode::CallerRan;
        }

        let permits = Arc::clone(&self.permits);
        let queued = Arc::clone(&self.queued);
        queued.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            // Acquire blocks until a worker frees up; the queue itself is
            // unbounded.
            let permit = permits.acquire_owned().await;
            queued.fetch_sub(1, Ordering::SeqCst);
            if permit.is_ok() {
                task.await;
            }
        });
        DispatchMode::Queued
    }

    pub fn backlog(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Wait until all workers are idle and the queue is drained, up to
    /// `timeout`. Returns true on a clean drain.
    pub async fn drain(&self, max_workers: usize, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.queued.load(Ordering::SeqCst) == 0
                && self.permits.available_permits() == max_workers
            {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawns_while_permits_free() {
        let pool = EvaluationPool::new(2, 64);
        let mode = pool.dispatch(async {}).await;
        assert_eq!(mode, DispatchMode::Spawned);
    }

    #[tokio::test]
    async fn test_queues_when_workers_busy() {
        let pool = EvaluationPool::new(1, 64);
        // Occupy the single worker.
        let first = pool
            .dispatch(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
            })
            .await;
        assert_eq!(first, DispatchMode::Spawned);

        let second = pool.dispatch(async {}).await;
        assert_eq!(second, DispatchMode::Queued);
        assert_eq!(pool.backlog(), 1);

        assert!(pool.drain(1, Duration::from_secs(2)).await);
        assert_eq!(pool.backlog(), 0);
    }

    #[tokio::test]
    async fn test_caller_runs_over_threshold() {
        let pool = EvaluationPool::new(1, 0);
        let _ = pool
            .dispatch(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await;

        // Threshold 0: the next submission runs inline and completes before
        // dispatch returns.
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let mode = pool
            .dispatch(async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(mode, DispatchMode::CallerRan);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
