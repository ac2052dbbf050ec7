//! Test helper utilities: in-process mock HTTP services standing in for the
//! inference host, the normalization LLM, and the callback listener, plus
//! builders for application state and multipart submissions.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use receipt_extract::app_state::AppState;
use receipt_extract::config::{AppConfig, LlmProvider};
use receipt_extract::services::callback::CallbackDispatcher;
use receipt_extract::services::normalize::Normalizer;
use receipt_extract::services::pipeline::ReceiptPipeline;
use receipt_extract::services::queue::{JobQueue, JobReceiver};
use receipt_extract::services::spool::ImageSpool;
use receipt_extract::services::stages::{DocExtractStage, DocQaStage};
use receipt_extract::services::throttle::PipelineGate;

/// Serve a router on an ephemeral local port; returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Mock inference host ──────────────────────────────────────────────────

struct InferenceState {
    load_calls: Arc<AtomicUsize>,
    qa_calls: Arc<AtomicUsize>,
    extract_calls: Arc<AtomicUsize>,
    in_flight: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
    extract_text: String,
    handler_delay: Duration,
}

pub struct InferenceMock {
    pub url: String,
    pub load_calls: Arc<AtomicUsize>,
    pub qa_calls: Arc<AtomicUsize>,
    pub extract_calls: Arc<AtomicUsize>,
    /// Highest number of simultaneously-executing inference handlers seen.
    /// With the pipeline gate in place this must never exceed 1.
    pub max_in_flight: Arc<AtomicUsize>,
}

/// Mock of the document inference host. Q&A answers echo the question; a
/// question containing `[boom]` makes that call fail with a 500 so tests can
/// inject per-question stage failures.
pub async fn spawn_inference_mock(extract_text: &str, handler_delay: Duration) -> InferenceMock {
    let state = Arc::new(InferenceState {
        load_calls: Arc::new(AtomicUsize::new(0)),
        qa_calls: Arc::new(AtomicUsize::new(0)),
        extract_calls: Arc::new(AtomicUsize::new(0)),
        in_flight: AtomicUsize::new(0),
        max_in_flight: Arc::new(AtomicUsize::new(0)),
        extract_text: extract_text.to_string(),
        handler_delay,
    });

    let router = Router::new()
        .route("/v1/models/load", post(load_model))
        .route("/v1/doc-qa", post(doc_qa))
        .route("/v1/doc-extract", post(doc_extract))
        .with_state(Arc::clone(&state));

    InferenceMock {
        url: serve(router).await,
        load_calls: Arc::clone(&state.load_calls),
        qa_calls: Arc::clone(&state.qa_calls),
        extract_calls: Arc::clone(&state.extract_calls),
        max_in_flight: Arc::clone(&state.max_in_flight),
    }
}

async fn track_in_flight(state: &InferenceState) {
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(state.handler_delay).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
}

async fn load_model(
    State(state): State<Arc<InferenceState>>,
    Json(_body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    state.load_calls.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({"status": "loaded"}))
}

async fn doc_qa(
    State(state): State<Arc<InferenceState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state.qa_calls.fetch_add(1, Ordering::SeqCst);
    track_in_flight(&state).await;

    let question = body["question"].as_str().unwrap_or_default().to_string();
    if question.contains("[boom]") {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(serde_json::json!({
        "answer": format!("answer to: {question}"),
        "score": 0.93,
    })))
}

async fn doc_extract(
    State(state): State<Arc<InferenceState>>,
    Json(_body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    state.extract_calls.fetch_add(1, Ordering::SeqCst);
    track_in_flight(&state).await;
    Json(serde_json::json!({"text": state.extract_text}))
}

// ── Mock Ollama backend ──────────────────────────────────────────────────

pub struct LlmMock {
    pub url: String,
    pub calls: Arc<AtomicUsize>,
}

/// Mock Ollama server whose `/api/chat` always replies with the given
/// message content.
pub async fn spawn_ollama_mock(content: &str) -> LlmMock {
    let calls = Arc::new(AtomicUsize::new(0));
    let content = content.to_string();
    let calls_handler = Arc::clone(&calls);

    let router = Router::new().route(
        "/api/chat",
        post(move |Json(_body): Json<serde_json::Value>| {
            let content = content.clone();
            let calls = Arc::clone(&calls_handler);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(serde_json::json!({
                    "message": {"role": "assistant", "content": content},
                }))
            }
        }),
    );

    LlmMock {
        url: serve(router).await,
        calls,
    }
}

// ── Mock callback listener ───────────────────────────────────────────────

pub struct CallbackMock {
    pub url: String,
    pub hits: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl CallbackMock {
    pub fn hit_count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }
}

/// Callback listener that records every payload and answers with the given
/// status (set a server error to exercise the retry loop).
pub async fn spawn_callback_mock(status: StatusCode) -> CallbackMock {
    let hits: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let hits_handler = Arc::clone(&hits);

    let router = Router::new().route(
        "/",
        post(move |Json(body): Json<serde_json::Value>| {
            let hits = Arc::clone(&hits_handler);
            async move {
                hits.lock().unwrap().push(body);
                status
            }
        }),
    );

    CallbackMock {
        url: serve(router).await,
        hits,
    }
}

// ── Application under test ───────────────────────────────────────────────

/// Config pointing at the mock services, with test-friendly timeouts.
pub fn test_config(inference_url: &str, ollama_url: &str) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        inference_url: inference_url.to_string(),
        inference_api_token: None,
        doc_qa_model: "test/doc-qa".to_string(),
        doc_extract_model: "test/doc-extract".to_string(),
        llm_provider: LlmProvider::Ollama,
        ollama_url: ollama_url.to_string(),
        ollama_model: "test-llm".to_string(),
        minimax_api_key: None,
        minimax_base_url: "https://api.minimax.io".to_string(),
        minimax_model: "MiniMax-M2.5".to_string(),
        pipeline_wait_timeout_secs: None,
        include_raw: true,
        callback_url: None,
        callback_timeout_secs: 1,
        callback_max_retries: 2,
        spool_dir: None,
    }
}

/// Build application state the way `main` does, against a test config.
pub fn build_state(config: &AppConfig) -> (AppState, JobReceiver) {
    let qa = DocQaStage::new(
        &config.inference_url,
        config.inference_api_token.as_deref(),
        &config.doc_qa_model,
    );
    let extract = DocExtractStage::new(
        &config.inference_url,
        config.inference_api_token.as_deref(),
        &config.doc_extract_model,
    );
    let normalizer = Normalizer::from_config(config);
    let pipeline = ReceiptPipeline::new(qa, extract, normalizer);
    let gate = PipelineGate::new(config.pipeline_wait_timeout_secs.map(Duration::from_secs));
    let callbacks = CallbackDispatcher::new(
        config.callback_url.clone(),
        Duration::from_secs(config.callback_timeout_secs),
        config.callback_max_retries,
    );
    let (queue, receiver) = JobQueue::new();
    let spool = ImageSpool::new(config.spool_dir.clone()).expect("spool init");

    (
        AppState::new(pipeline, gate, queue, spool, callbacks, config.include_raw),
        receiver,
    )
}

/// A small but fully valid PNG for submissions.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([220, 220, 220]));
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode fixture png");
    bytes
}

/// Multipart form with an image part and an optional `questions` JSON part.
pub fn image_form(image: Vec<u8>, questions: Option<&str>) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(image)
            .file_name("receipt.png")
            .mime_str("image/png")
            .unwrap(),
    );
    if let Some(q) = questions {
        form = form.text("questions", q.to_string());
    }
    form
}

/// Poll until `cond` holds or the deadline passes.
pub async fn wait_until<F: Fn() -> bool>(cond: F, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}
