//! Liveness, Readiness and Metrics Routes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::AppState;

/// Readiness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Liveness probe
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "customer-scoring",
    }))
}

/// Readiness probe; reports whether artifacts are loaded
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model_loaded = state.predictor.is_loaded();
    Json(HealthResponse {
        status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
        model_loaded,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}
