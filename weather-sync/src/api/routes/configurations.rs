//! Tenant configuration routes.
//!
//! `PUT` inserts when the body carries no id (or id 0) and updates
//! otherwise. The API key is tested against the weather provider before
//! anything is stored. The `active` flag belongs to the scheduler and is
//! never written here.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::domain::{Configuration, TenantId};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_configurations).put(put_configuration))
        .route(
            "/{id}",
            get(get_configuration).delete(delete_configuration),
        )
}

async fn list_configurations(State(state): State<AppState>) -> ApiResult<Json<Vec<Configuration>>> {
    Ok(Json(state.configs.list().await?))
}

async fn get_configuration(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<Configuration>> {
    Ok(Json(state.configs.get(id).await?))
}

async fn put_configuration(
    State(state): State<AppState>,
    Json(config): Json<Configuration>,
) -> ApiResult<(StatusCode, Json<Configuration>)> {
    config.validate()?;

    if let Err(e) = state.weather.test_authentication(&config.api_key).await {
        warn!(id = config.id, error = %e, "API key rejected by weather provider");
        return Err(ApiError::BadRequest(format!("testing authentication: {e}")));
    }

    let stored = state.configs.upsert(&config).await?;
    info!(
        id = stored.id,
        enabled = stored.enabled,
        project_ids = ?stored.project_ids,
        "Configuration stored"
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn delete_configuration(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<StatusCode> {
    state.configs.delete(id).await?;
    info!(id, "Configuration deleted");
    Ok(StatusCode::NO_CONTENT)
}
