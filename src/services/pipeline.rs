use std::time::Instant;

use crate::models::receipt::{ReceiptMeta, ReceiptRecord};
use crate::models::stage::{ExtractOutcome, QaAnswer, RawOutputs};
use crate::services::normalize::{NormalizedReceipt, Normalizer};
use crate::services::stages::{DocExtractStage, DocQaStage};

/// Questions asked of the Q&A stage when the caller supplies none. Mirrors
/// the receipt schema field for field.
pub const DEFAULT_QUESTIONS: [&str; 9] = [
    "What is the store or business name?",
    "What is the shop name?",
    "What is the date on the receipt?",
    "What is the total amount?",
    "What is the tax amount?",
    "What is the GST amount?",
    "What is the sales tax?",
    "What is the amount received?",
    "What is the amount payable?",
];

/// One full pipeline run's output. Always produced; failures inside the run
/// surface as error markers, a `Failed` extraction, or `receipt_meta`.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub receipt: ReceiptRecord,
    pub receipt_meta: Option<ReceiptMeta>,
    pub qa_results: Vec<QaAnswer>,
    pub extraction: ExtractOutcome,
}

impl PipelineResult {
    pub fn raw_outputs(&self) -> RawOutputs {
        RawOutputs {
            doc_qa: self.qa_results.clone(),
            extraction: self.extraction.clone(),
        }
    }
}

/// Sequences the two extraction stages and the normalizer over one image.
///
/// Order is fixed: Q&A stage for every question, then whole-document
/// extraction, then a single normalization pass over both outputs. A failing
/// stage call never aborts its siblings; every invocation completes with a
/// value.
pub struct ReceiptPipeline {
    qa: DocQaStage,
    extract: DocExtractStage,
    normalizer: Normalizer,
}

impl ReceiptPipeline {
    pub fn new(qa: DocQaStage, extract: DocExtractStage, normalizer: Normalizer) -> Self {
        Self {
            qa,
            extract,
            normalizer,
        }
    }

    pub fn default_questions() -> Vec<String> {
        DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
    }

    pub async fn process(&self, image_bytes: &[u8], questions: &[String]) -> PipelineResult {
        let start = Instant::now();

        let mut qa_results = Vec::with_capacity(questions.len());
        for question in questions {
            match self.qa.answer(image_bytes, question).await {
                Ok(answer) => qa_results.push(QaAnswer::answered(question.clone(), answer)),
                Err(e) => {
                    tracing::warn!(question = %question, error = %e, "doc-qa stage failed for question");
                    qa_results.push(QaAnswer::failed(question.clone(), &e.to_string()));
                }
            }
        }

        let extraction = match self.extract.extract(image_bytes).await {
            Ok(text) => ExtractOutcome::from_model_text(&text),
            Err(e) => {
                tracing::warn!(error = %e, "doc-extract stage failed");
                ExtractOutcome::Failed(e.to_string())
            }
        };

        let NormalizedReceipt { receipt, meta } =
            self.normalizer.normalize(&qa_results, &extraction).await;

        let elapsed = start.elapsed();
        metrics::histogram!("pipeline_processing_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            questions = questions.len(),
            qa_errors = qa_results.iter().filter(|a| a.is_error_marker()).count(),
            extraction_failed = extraction.is_failed(),
            normalized = meta.is_none(),
            duration_ms = elapsed.as_millis() as u64,
            "pipeline run complete"
        );

        PipelineResult {
            receipt,
            receipt_meta: meta,
            qa_results,
            extraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::receipt::RECEIPT_FIELDS;

    #[test]
    fn test_default_questions_cover_schema() {
        let questions = ReceiptPipeline::default_questions();
        assert_eq!(questions.len(), RECEIPT_FIELDS.len());
        assert!(questions.iter().all(|q| q.ends_with('?')));
    }
}
