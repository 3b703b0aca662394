//! Serial in-process task queues.
//!
//! Each queue owns exactly one worker task, so enqueued IDs run strictly in
//! FIFO order with no overlap within a queue. Two independent queues (one per
//! task shape) may run concurrently with each other.

mod jobs;

pub use jobs::{PromptTestJob, TestRunJob};

use crate::error::ExecutionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

/// Work processed by a queue worker.
#[async_trait]
pub trait QueueJob: Send + Sync + 'static {
    /// Queue name for log lines.
    fn kind(&self) -> &'static str;

    /// Process one enqueued ID to a terminal state. An `Err` here is an
    /// infrastructure fault; task-level failures must be absorbed into the
    /// task's own FAILED state and returned as `Ok`.
    async fn process(&self, id: i64) -> Result<(), ExecutionError>;

    /// Best-effort: mark the entity FAILED after an infrastructure fault so
    /// it never appears stuck in RUNNING.
    fn record_failure(&self, id: i64);
}

/// Handle to one single-worker queue.
pub struct TaskQueue {
    tx: UnboundedSender<i64>,
    pending: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl TaskQueue {
    /// Spawn the worker and return the handle.
    pub fn start<J: QueueJob>(job: J) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);
        let worker = tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                tracing::debug!(queue = job.kind(), id, "processing");
                if let Err(err) = job.process(id).await {
                    tracing::warn!(queue = job.kind(), id, error = %err, "job failed");
                    job.record_failure(id);
                }
                counter.fetch_sub(1, Ordering::SeqCst);
            }
            tracing::debug!(queue = job.kind(), "worker stopped");
        });
        Self {
            tx,
            pending,
            worker,
        }
    }

    /// Hand an ID to the worker; returns once it is queued, not processed.
    pub fn enqueue(&self, id: i64) -> Result<(), ExecutionError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(id).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ExecutionError::Unexpected(
                "queue worker is no longer running".into(),
            ));
        }
        Ok(())
    }

    /// Number of enqueued IDs not yet finished (including the in-flight one).
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until the queue drains. Returns `false` on timeout.
    pub async fn wait_for_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            if self.pending() == 0 {
                return true;
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Close the queue and wait for the worker to finish whatever is already
    /// enqueued.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
