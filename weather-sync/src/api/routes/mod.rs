//! API route modules.

pub mod configurations;
pub mod health;
pub mod logging;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/v1/configurations", configurations::router())
        .nest("/v1/logging", logging::router())
        .with_state(state)
}
