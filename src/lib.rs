//! Receipt/Document Extraction Pipeline
//!
//! This library provides the core functionality for the receipt-extract
//! system: an asynchronous extraction pipeline that runs a document image
//! through two inference stages, merges their outputs into a fixed-schema
//! receipt record via an LLM normalization call, and returns or delivers
//! the result with single-flight throttling and bounded-retry callbacks.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

use axum::routing::{get, post};
use axum::Router;

use app_state::AppState;

/// API routes shared by the server binary and the integration tests.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/process", post(routes::process::process_sync))
        .route("/api/v1/jobs", post(routes::process::submit_job))
        .with_state(state)
}
