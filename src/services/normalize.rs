use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{AppConfig, LlmProvider};
use crate::models::receipt::{ReceiptMeta, ReceiptRecord};
use crate::models::stage::{ExtractOutcome, QaAnswer};

/// Normalization calls can sit behind slow local models.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You are a receipt data extractor. You will receive two raw outputs from different document models (per-question Q&A and whole-document extraction). Your task is to merge them into a single JSON object with exactly these keys (use null for any missing value):
- store_name (string): store or business name
- shop_name (string): shop name, can be same as store_name
- date (string): transaction date
- total_amount (number or string): total amount
- tax_amount (number or string): tax amount
- gst_amount (number or string): GST amount
- sales_tax (number or string): sales tax
- received (number or string): amount received
- payable (number or string): amount payable

Output ONLY valid JSON with these keys. No markdown, no explanation. Prefer numbers for amount fields when possible.";

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

/// Internal failure of the remote completion call. Never escapes
/// [`Normalizer::normalize`]; collapsed into a diagnostic there.
#[derive(Debug, thiserror::Error)]
enum NormalizeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("normalization backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("MINIMAX_API_KEY not set")]
    MissingApiKey,

    #[error("no choices in Minimax response")]
    NoChoices,

    #[error("empty response from normalization backend")]
    EmptyResponse,
}

/// Which remote backend performs the merge.
enum NormalizeBackend {
    Ollama {
        url: String,
        model: String,
    },
    Minimax {
        base_url: String,
        api_key: Option<String>,
        model: String,
    },
}

/// Result of a normalization run. `meta` is present exactly when the remote
/// response was not fully trustworthy; the receipt is schema-complete either
/// way.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReceipt {
    pub receipt: ReceiptRecord,
    pub meta: Option<ReceiptMeta>,
}

/// Merges both stages' raw outputs into the fixed receipt schema via an LLM
/// call. Failure mode is "always returns a record": hard failures become
/// `meta._error`, unparsable responses additionally carry `meta._raw`.
pub struct Normalizer {
    http: Client,
    backend: NormalizeBackend,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    format: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct MinimaxChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct MinimaxChatResponse {
    #[serde(default)]
    choices: Vec<MinimaxChoice>,
}

#[derive(Deserialize)]
struct MinimaxChoice {
    #[serde(default)]
    message: Option<MinimaxMessage>,
}

#[derive(Deserialize)]
struct MinimaxMessage {
    #[serde(default)]
    content: String,
}

impl Normalizer {
    pub fn from_config(config: &AppConfig) -> Self {
        let backend = match config.llm_provider {
            LlmProvider::Ollama => NormalizeBackend::Ollama {
                url: config.ollama_url.trim_end_matches('/').to_string(),
                model: config.ollama_model.clone(),
            },
            LlmProvider::Minimax => NormalizeBackend::Minimax {
                base_url: config.minimax_base_url.trim_end_matches('/').to_string(),
                api_key: config.minimax_api_key.clone(),
                model: config.minimax_model.clone(),
            },
        };
        Self {
            http: Client::new(),
            backend,
        }
    }

    /// Merge stage outputs into the nine-key schema. Never fails.
    pub async fn normalize(
        &self,
        qa_results: &[QaAnswer],
        extraction: &ExtractOutcome,
    ) -> NormalizedReceipt {
        match self.request_completion(qa_results, extraction).await {
            Ok(text) => parse_llm_response(&text),
            Err(e) => {
                tracing::warn!(error = %e, "normalization backend call failed");
                NormalizedReceipt {
                    receipt: ReceiptRecord::empty(),
                    meta: Some(ReceiptMeta::error(e.to_string())),
                }
            }
        }
    }

    async fn request_completion(
        &self,
        qa_results: &[QaAnswer],
        extraction: &ExtractOutcome,
    ) -> Result<String, NormalizeError> {
        let user_content = build_user_content(qa_results, extraction)?;
        let messages = [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: &user_content,
            },
        ];

        match &self.backend {
            NormalizeBackend::Ollama { url, model } => {
                let body = OllamaChatRequest {
                    model,
                    messages,
                    format: "json",
                    stream: false,
                };
                let response = self
                    .http
                    .post(format!("{url}/api/chat"))
                    .timeout(COMPLETION_TIMEOUT)
                    .json(&body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Err(NormalizeError::Backend { status, message });
                }

                let chat: OllamaChatResponse = response.json().await?;
                match chat.message {
                    Some(message) if !message.content.is_empty() => Ok(message.content),
                    _ => Err(NormalizeError::EmptyResponse),
                }
            }
            NormalizeBackend::Minimax {
                base_url,
                api_key,
                model,
            } => {
                let api_key = api_key.as_deref().ok_or(NormalizeError::MissingApiKey)?;
                let body = MinimaxChatRequest { model, messages };
                let response = self
                    .http
                    .post(format!("{base_url}/v1/chat/completions"))
                    .timeout(COMPLETION_TIMEOUT)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Err(NormalizeError::Backend { status, message });
                }

                let chat: MinimaxChatResponse = response.json().await?;
                let content = chat
                    .choices
                    .into_iter()
                    .next()
                    .ok_or(NormalizeError::NoChoices)?
                    .message
                    .map(|m| m.content)
                    .unwrap_or_default();
                if content.is_empty() {
                    return Err(NormalizeError::EmptyResponse);
                }
                Ok(content)
            }
        }
    }
}

fn build_user_content(
    qa_results: &[QaAnswer],
    extraction: &ExtractOutcome,
) -> Result<String, NormalizeError> {
    Ok(format!(
        "Document Q&A results:\n{}\n\nWhole-document extraction result:\n{}",
        serde_json::to_string_pretty(qa_results)?,
        serde_json::to_string_pretty(extraction)?,
    ))
}

/// Parse the LLM's reply into the fixed schema. Code fences are stripped
/// first; anything that does not parse into a JSON object becomes a soft
/// failure carrying the original text.
fn parse_llm_response(text: &str) -> NormalizedReceipt {
    let mut cleaned = text.trim();
    if cleaned.contains("```") {
        if let Some(caps) = RE_CODE_FENCE.captures(cleaned) {
            cleaned = caps.get(1).map(|m| m.as_str().trim()).unwrap_or(cleaned);
        }
    }

    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(_) => {
            return NormalizedReceipt {
                receipt: ReceiptRecord::empty(),
                meta: Some(ReceiptMeta::error_with_raw("Invalid JSON from LLM", cleaned)),
            }
        }
    };

    match value.as_object() {
        Some(map) => NormalizedReceipt {
            receipt: ReceiptRecord::project(map),
            meta: None,
        },
        None => NormalizedReceipt {
            receipt: ReceiptRecord::empty(),
            meta: Some(ReceiptMeta::error_with_raw(
                "LLM did not return a JSON object",
                cleaned,
            )),
        },
    }
}
