use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Per-call inference timeout.
const INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// First use pages model weights in on the inference host; allow much longer.
const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference backend returned {status}: {message}")]
    Backend { status: u16, message: String },
}

/// Lazily-constructed handle to the inference host. Built at most once per
/// stage per process; the first caller pays the model-load cost.
struct StageBackend {
    http: Client,
}

fn authorized(builder: RequestBuilder, api_token: Option<&str>) -> RequestBuilder {
    match api_token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    model: &'a str,
}

async fn init_backend(
    base_url: &str,
    api_token: Option<&str>,
    model: &str,
) -> Result<StageBackend, StageError> {
    let http = Client::builder().timeout(INFERENCE_TIMEOUT).build()?;

    let url = format!("{base_url}/v1/models/load");
    let response = authorized(http.post(&url), api_token)
        .timeout(MODEL_LOAD_TIMEOUT)
        .json(&LoadRequest { model })
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(StageError::Backend { status, message });
    }

    tracing::info!(model, "inference model loaded");
    Ok(StageBackend { http })
}

/// Client for the per-question document Q&A model.
pub struct DocQaStage {
    base_url: String,
    api_token: Option<String>,
    model: String,
    backend: OnceCell<StageBackend>,
}

#[derive(Serialize)]
struct QaRequest<'a> {
    model: &'a str,
    image: String,
    question: &'a str,
}

#[derive(Deserialize)]
struct QaResponse {
    answer: String,
    #[serde(default)]
    score: Option<f64>,
}

impl DocQaStage {
    pub fn new(base_url: &str, api_token: Option<&str>, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.map(str::to_string),
            model: model.to_string(),
            backend: OnceCell::new(),
        }
    }

    async fn backend(&self) -> Result<&StageBackend, StageError> {
        self.backend
            .get_or_try_init(|| {
                init_backend(&self.base_url, self.api_token.as_deref(), &self.model)
            })
            .await
    }

    /// Ask one question about the document image; returns the model's answer
    /// text with surrounding whitespace stripped.
    pub async fn answer(&self, image_bytes: &[u8], question: &str) -> Result<String, StageError> {
        let backend = self.backend().await?;

        let body = QaRequest {
            model: &self.model,
            image: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            question,
        };

        let url = format!("{}/v1/doc-qa", self.base_url);
        let response = authorized(backend.http.post(&url), self.api_token.as_deref())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StageError::Backend { status, message });
        }

        let qa: QaResponse = response.json().await?;
        tracing::debug!(question, score = qa.score, "doc-qa answer received");
        Ok(qa.answer.trim().to_string())
    }
}

/// Client for the whole-document extraction model. Returns the model's raw
/// text output; JSON-parse leniency is applied by the orchestrator.
pub struct DocExtractStage {
    base_url: String,
    api_token: Option<String>,
    model: String,
    backend: OnceCell<StageBackend>,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    model: &'a str,
    image: String,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ExtractResponse {
    text: String,
}

impl DocExtractStage {
    pub fn new(base_url: &str, api_token: Option<&str>, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.map(str::to_string),
            model: model.to_string(),
            backend: OnceCell::new(),
        }
    }

    async fn backend(&self) -> Result<&StageBackend, StageError> {
        self.backend
            .get_or_try_init(|| {
                init_backend(&self.base_url, self.api_token.as_deref(), &self.model)
            })
            .await
    }

    pub async fn extract(&self, image_bytes: &[u8]) -> Result<String, StageError> {
        let backend = self.backend().await?;

        let body = ExtractRequest {
            model: &self.model,
            image: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            max_tokens: 512,
        };

        let url = format!("{}/v1/doc-extract", self.base_url);
        let response = authorized(backend.http.post(&url), self.api_token.as_deref())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StageError::Backend { status, message });
        }

        let extraction: ExtractResponse = response.json().await?;
        Ok(extraction.text)
    }
}
