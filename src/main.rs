use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use receipt_extract::app_state::AppState;
use receipt_extract::config::AppConfig;
use receipt_extract::routes;
use receipt_extract::services::{
    callback::CallbackDispatcher,
    normalize::Normalizer,
    pipeline::ReceiptPipeline,
    queue::JobQueue,
    spool::ImageSpool,
    stages::{DocExtractStage, DocQaStage},
    throttle::PipelineGate,
    worker,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing receipt-extract server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("receipt_jobs_total", "Total processing requests submitted");
    metrics::describe_counter!("receipt_jobs_completed", "Total async jobs completed");
    metrics::describe_counter!("receipt_jobs_failed", "Total async jobs that failed");
    metrics::describe_gauge!(
        "receipt_queue_depth",
        "Current number of pending jobs in the queue"
    );
    metrics::describe_histogram!(
        "pipeline_processing_seconds",
        "Time for one full pipeline run"
    );
    metrics::describe_counter!("callback_attempts_total", "Total callback delivery attempts");

    // Initialize image spool
    tracing::info!("Initializing image spool");
    let spool = ImageSpool::new(config.spool_dir.clone()).expect("Failed to initialize image spool");

    // Initialize extraction stages
    tracing::info!(model = %config.doc_qa_model, "Initializing doc-qa stage");
    let qa = DocQaStage::new(
        &config.inference_url,
        config.inference_api_token.as_deref(),
        &config.doc_qa_model,
    );

    tracing::info!(model = %config.doc_extract_model, "Initializing doc-extract stage");
    let extract = DocExtractStage::new(
        &config.inference_url,
        config.inference_api_token.as_deref(),
        &config.doc_extract_model,
    );

    // Initialize result normalizer
    tracing::info!(provider = %config.llm_provider, "Initializing result normalizer");
    let normalizer = Normalizer::from_config(&config);

    let pipeline = ReceiptPipeline::new(qa, extract, normalizer);
    let gate = PipelineGate::new(config.pipeline_wait_timeout_secs.map(Duration::from_secs));
    let callbacks = CallbackDispatcher::new(
        config.callback_url.clone(),
        Duration::from_secs(config.callback_timeout_secs),
        config.callback_max_retries,
    );

    let (queue, job_receiver) = JobQueue::new();

    // Create shared application state
    let state = AppState::new(
        pipeline,
        gate,
        queue,
        spool,
        callbacks,
        config.include_raw,
    );

    // Spawn the single background worker (the only queue consumer)
    worker::spawn(state.clone(), job_receiver);

    // Build API routes
    let app = receipt_extract::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting receipt-extract on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
