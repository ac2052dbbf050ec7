use std::sync::Arc;

use crate::services::callback::CallbackDispatcher;
use crate::services::pipeline::ReceiptPipeline;
use crate::services::queue::JobQueue;
use crate::services::spool::ImageSpool;
use crate::services::throttle::PipelineGate;

/// Shared application state passed to all route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReceiptPipeline>,
    pub gate: Arc<PipelineGate>,
    pub queue: Arc<JobQueue>,
    pub spool: Arc<ImageSpool>,
    pub callbacks: Arc<CallbackDispatcher>,
    /// Include raw stage outputs in responses and callback payloads.
    pub include_raw: bool,
}

impl AppState {
    pub fn new(
        pipeline: ReceiptPipeline,
        gate: PipelineGate,
        queue: JobQueue,
        spool: ImageSpool,
        callbacks: CallbackDispatcher,
        include_raw: bool,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            gate: Arc::new(gate),
            queue: Arc::new(queue),
            spool: Arc::new(spool),
            callbacks: Arc::new(callbacks),
            include_raw,
        }
    }
}
