use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub spool: ComponentHealth,
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub status: String,
    pub depth: u64,
}

/// GET /health — dependency status for the spool directory and job queue.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let spool_ok = match tokio::fs::metadata(state.spool.dir()).await {
        Ok(meta) => meta.is_dir(),
        Err(_) => false,
    };

    let spool = ComponentHealth {
        status: if spool_ok { "ok" } else { "error" }.to_string(),
    };
    let queue = QueueHealth {
        status: "ok".to_string(),
        depth: state.queue.depth(),
    };

    let status_code = if spool_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if spool_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { spool, queue },
    };

    (status_code, Json(response))
}
