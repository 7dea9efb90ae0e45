//! API error handling.
//!
//! Every failure is rendered as a `{code, message}` JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: &'static str,
    pub message: String,
}

/// Failures the control plane reports to its callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input, a rejected API key or an invalid log filter.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A configuration that parsed but breaks a field rule.
    #[error("{0}")]
    Validation(String),

    /// Details stay in the log; the body carries a generic message.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => {
                Self::NotFound(format!("{entity_type} with id '{id}' not found"))
            }
            Error::Validation(msg) => Self::Validation(msg),
            Error::DatabaseSqlx(_) | Error::Serialization(_) => {
                tracing::error!(error = %err, "Configuration store failed");
                Self::Internal("Database error occurred".into())
            }
            other => {
                tracing::error!(error = %other, "Unexpected error");
                Self::Internal("An unexpected error occurred".into())
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
