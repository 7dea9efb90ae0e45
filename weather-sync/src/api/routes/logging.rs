//! Runtime log filter.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

async fn get_logging_config(State(state): State<AppState>) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging = state
        .logging
        .as_ref()
        .ok_or_else(|| ApiError::Internal("Logging configuration not available".into()))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging.get_filter(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging = state
        .logging
        .as_ref()
        .ok_or_else(|| ApiError::Internal("Logging configuration not available".into()))?;

    logging
        .set_filter(&request.filter)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging.get_filter(),
    }))
}
