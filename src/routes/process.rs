use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{ErrorResponse, ProcessResponse, SubmitResponse};
use crate::models::job::Job;
use crate::services::pipeline::ReceiptPipeline;
use crate::services::throttle::GateError;

type Rejection = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> Rejection {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

/// Image and questions pulled out of a multipart submission. Shared between
/// the synchronous and asynchronous endpoints.
struct Submission {
    image: Vec<u8>,
    questions: Vec<String>,
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission, Rejection> {
    let mut image: Option<Vec<u8>> = None;
    let mut questions: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("Malformed multipart body"))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") | Some("file") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| bad_request("Failed to read image field"))?;
                image = Some(data.to_vec());
            }
            Some("questions") => {
                questions = field.text().await.ok();
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| bad_request("Missing image: use a multipart 'image' file field"))?;

    // Reject anything the image crate cannot fully decode before it enters
    // the pipeline.
    image::load_from_memory(&image).map_err(|e| bad_request(format!("Invalid image: {e}")))?;

    Ok(Submission {
        image,
        questions: parse_questions(questions.as_deref()),
    })
}

/// Lenient questions parsing: only a non-empty JSON array counts, with
/// non-string entries stringified; anything else falls back to the built-in
/// question list.
fn parse_questions(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return ReceiptPipeline::default_questions();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) if !items.is_empty() => items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => ReceiptPipeline::default_questions(),
    }
}

/// POST /api/v1/process — run the pipeline synchronously.
///
/// Blocks on the pipeline gate (subject to the configured wait timeout) and
/// returns the normalized receipt, optionally with raw stage outputs and the
/// normalization diagnostic.
pub async fn process_sync(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, Rejection> {
    let submission = read_submission(multipart).await?;
    metrics::counter!("receipt_jobs_total").increment(1);

    let _permit = state.gate.acquire().await.map_err(|e| match e {
        GateError::WaitTimeout => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Queue wait timeout")),
        ),
        GateError::Closed => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Pipeline unavailable")),
        ),
    })?;

    let result = state
        .pipeline
        .process(&submission.image, &submission.questions)
        .await;

    let raw = state.include_raw.then(|| result.raw_outputs());
    Ok(Json(ProcessResponse {
        receipt: result.receipt,
        raw,
        receipt_meta: result.receipt_meta,
    }))
}

/// POST /api/v1/jobs — accept a job for background processing.
///
/// Spools the image under a fresh job id, enqueues, and acknowledges
/// immediately; the outcome is delivered to the configured callback
/// endpoint. This path never waits on the pipeline gate.
pub async fn submit_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), Rejection> {
    let submission = read_submission(multipart).await?;

    let job_id = Uuid::new_v4();
    let image_path = state
        .spool
        .store(job_id, &submission.image)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to spool submitted image");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to persist image")),
            )
        })?;

    let job = Job {
        id: job_id,
        image_path: image_path.clone(),
        questions: submission.questions,
        submitted_at: Utc::now(),
    };

    if let Err(e) = state.queue.enqueue(job) {
        // The worker is gone, so nothing would ever clean this file up.
        if let Err(cleanup) = state.spool.remove(&image_path).await {
            tracing::warn!(job_id = %job_id, error = %cleanup, "failed to remove orphaned spool file");
        }
        tracing::error!(job_id = %job_id, error = %e, "failed to enqueue job");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Job queue unavailable")),
        ));
    }

    metrics::counter!("receipt_jobs_total").increment(1);
    tracing::info!(job_id = %job_id, "job accepted");
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questions_default_when_absent() {
        assert_eq!(parse_questions(None), ReceiptPipeline::default_questions());
    }

    #[test]
    fn test_questions_default_on_malformed_json() {
        assert_eq!(
            parse_questions(Some("not json")),
            ReceiptPipeline::default_questions()
        );
    }

    #[test]
    fn test_questions_default_on_empty_or_non_array() {
        assert_eq!(parse_questions(Some("[]")), ReceiptPipeline::default_questions());
        assert_eq!(
            parse_questions(Some(r#"{"q": "total?"}"#)),
            ReceiptPipeline::default_questions()
        );
    }

    #[test]
    fn test_questions_stringify_entries() {
        let parsed = parse_questions(Some(r#"["What is the total?", 42]"#));
        assert_eq!(parsed, vec!["What is the total?".to_string(), "42".to_string()]);
    }
}
