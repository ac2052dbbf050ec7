use chrono::Utc;
use tokio::task::JoinHandle;

use crate::app_state::AppState;
use crate::models::job::{CallbackPayload, Job};
use crate::services::pipeline::PipelineResult;
use crate::services::queue::JobReceiver;
use crate::services::spool::SpoolError;
use crate::services::throttle::GateError;

/// Spawn the single background worker task. Exactly one worker consumes the
/// queue; jobs run strictly in arrival order.
pub fn spawn(state: AppState, receiver: JobReceiver) -> JoinHandle<()> {
    tokio::spawn(run(state, receiver))
}

pub async fn run(state: AppState, mut receiver: JobReceiver) {
    tracing::info!("worker ready, waiting for jobs");
    while let Some(job) = receiver.next_job().await {
        process_job(&state, job).await;
    }
    tracing::info!("job queue closed, worker exiting");
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Spool(#[from] SpoolError),

    #[error("Invalid image: {0}")]
    Image(String),

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Drive one job to its terminal state: exactly one callback delivery and
/// exactly one spool deletion happen in every path, and neither a failed
/// job nor a failed cleanup stops the worker loop.
async fn process_job(state: &AppState, job: Job) {
    let queue_wait_ms = (Utc::now() - job.submitted_at).num_milliseconds();
    tracing::info!(
        job_id = %job.id,
        queue_wait_ms,
        questions = job.questions.len(),
        "processing job"
    );

    let payload = match run_job(state, &job).await {
        Ok(result) => {
            metrics::counter!("receipt_jobs_completed").increment(1);
            let raw = state.include_raw.then(|| result.raw_outputs());
            CallbackPayload::completed(job.id, result.receipt, raw, result.receipt_meta)
        }
        Err(e) => {
            metrics::counter!("receipt_jobs_failed").increment(1);
            tracing::error!(job_id = %job.id, error = %e, "job processing failed");
            CallbackPayload::failed(job.id, e.to_string())
        }
    };

    state.callbacks.deliver(&payload).await;

    if let Err(e) = state.spool.remove(&job.image_path).await {
        tracing::warn!(job_id = %job.id, error = %e, "failed to delete spooled image");
    }
}

async fn run_job(state: &AppState, job: &Job) -> Result<PipelineResult, JobError> {
    let image_bytes = state.spool.load(&job.image_path).await?;

    // Decode up front so an unreadable image fails fast without holding the
    // gate; the stages receive the original encoded bytes.
    image::load_from_memory(&image_bytes).map_err(|e| JobError::Image(e.to_string()))?;

    let _permit = state.gate.acquire_unbounded().await?;
    Ok(state.pipeline.process(&image_bytes, &job.questions).await)
}
