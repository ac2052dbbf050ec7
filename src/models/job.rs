use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use strum::Display;
use uuid::Uuid;

use crate::models::receipt::{ReceiptMeta, ReceiptRecord};
use crate::models::stage::RawOutputs;

/// A submitted unit of asynchronous work. Owned exclusively by the worker
/// from dequeue until its terminal callback + cleanup.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Spooled image file keyed by `id`; deleted unconditionally when the
    /// job reaches a terminal state.
    pub image_path: PathBuf,
    pub questions: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Terminal outcome reported in the callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Outbound notification body POSTed to the configured callback endpoint.
/// `receipt` is present and schema-complete only on `completed`; `error`
/// only on `failed`.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackPayload {
    pub job_id: Uuid,
    pub status: JobStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawOutputs>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_meta: Option<ReceiptMeta>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackPayload {
    pub fn completed(
        job_id: Uuid,
        receipt: ReceiptRecord,
        raw: Option<RawOutputs>,
        receipt_meta: Option<ReceiptMeta>,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            receipt: Some(receipt),
            raw,
            receipt_meta,
            error: None,
        }
    }

    pub fn failed(job_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            receipt: None,
            raw: None,
            receipt_meta: None,
            error: Some(error.into()),
        }
    }
}
