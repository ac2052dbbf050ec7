use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::job::Job;

/// In-memory FIFO job queue. Insertion never blocks and never applies
/// backpressure; jobs do not survive process restart.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicU64>,
}

/// Consumer half, held by the single worker task.
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicU64>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job queue is closed: worker has shut down")]
    Closed,
}

impl JobQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                depth: Arc::clone(&depth),
            },
            JobReceiver { rx, depth },
        )
    }

    /// Enqueue a job for the worker. Fails only if the worker is gone.
    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.tx.send(job).map_err(|_| QueueError::Closed)?;
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("receipt_queue_depth").set(depth as f64);
        Ok(())
    }

    /// Current number of pending jobs.
    pub fn depth(&self) -> u64 {
        self.depth.load(Ordering::SeqCst)
    }
}

impl JobReceiver {
    /// Wait for the next job in arrival order. Returns `None` once every
    /// producer handle has been dropped and the queue is drained.
    pub async fn next_job(&mut self) -> Option<Job> {
        let job = self.rx.recv().await?;
        let depth = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("receipt_queue_depth").set(depth as f64);
        Some(job)
    }
}
