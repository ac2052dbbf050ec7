use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Queue wait timeout")]
    WaitTimeout,

    #[error("pipeline gate closed")]
    Closed,
}

/// Capacity-1 gate shared by every path that runs the pipeline. The
/// inference backends cannot run concurrently, so at most one pipeline
/// execution may be in flight process-wide. The permit is RAII: release
/// happens exactly once, whether the protected call succeeds or not.
pub struct PipelineGate {
    permits: Semaphore,
    wait_timeout: Option<Duration>,
}

impl PipelineGate {
    pub fn new(wait_timeout: Option<Duration>) -> Self {
        Self {
            permits: Semaphore::new(1),
            wait_timeout,
        }
    }

    /// Acquire for a synchronous caller. Honors the configured wait timeout;
    /// without one, blocks until the gate frees up.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, GateError> {
        match self.wait_timeout {
            Some(limit) => match timeout(limit, self.permits.acquire()).await {
                Ok(Ok(permit)) => Ok(permit),
                Ok(Err(_)) => Err(GateError::Closed),
                Err(_) => Err(GateError::WaitTimeout),
            },
            None => self.permits.acquire().await.map_err(|_| GateError::Closed),
        }
    }

    /// Acquire for the worker: never rejected by the wait timeout, which
    /// only gates the synchronous boundary.
    pub async fn acquire_unbounded(&self) -> Result<SemaphorePermit<'_>, GateError> {
        self.permits.acquire().await.map_err(|_| GateError::Closed)
    }
}
