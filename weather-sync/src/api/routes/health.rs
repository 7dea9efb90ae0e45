//! Liveness, status and version routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{HealthResponse, StatusResponse, VersionResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/status", get(status))
        .route("/v1/version", get(version))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// The status last reported by the scheduler, listener or heartbeat.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.status.get();
    Json(StatusResponse {
        status,
        code: status.code(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
