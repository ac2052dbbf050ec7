use serde::Serialize;
use uuid::Uuid;

use crate::models::receipt::{ReceiptMeta, ReceiptRecord};
use crate::models::stage::RawOutputs;

/// Response for the synchronous processing endpoint.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub receipt: ReceiptRecord,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawOutputs>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_meta: Option<ReceiptMeta>,
}

/// Acknowledgment for the asynchronous submission endpoint.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
}

/// Uniform error body for rejected submissions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
