//! API Error Types
//!
//! Client mistakes answer 400 with a field-keyed body:
//!
//! ```json
//! {"errors": {"target": "This parameter is required."}}
//! ```
//!
//! Server-side failures answer with an `error` object and a `request_id`
//! that is also logged, so operators can correlate without the response
//! leaking internals.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::query::QueryError;
use crate::render::RenderError;

/// Field name -> message
pub type FieldErrors = BTreeMap<String, String>;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request parameters failed validation
    #[error("Validation error: {0:?}")]
    Validation(FieldErrors),

    /// Target parsing or evaluation error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Requested output cannot be produced by this server
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation(BTreeMap::from([(field.into(), message.into())]))
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Unsupported(format) => {
                ApiError::Unsupported(format!("no chart renderer configured for '{}'", format))
            }
            invalid @ RenderError::InvalidCallback(_) => ApiError::field("jsonp", invalid.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ValidationResponse<'a> {
    errors: &'a FieldErrors,
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                tracing::debug!(?errors, "request rejected");
                (StatusCode::BAD_REQUEST, Json(ValidationResponse { errors: &errors })).into_response()
            }
            ApiError::Query(e) if e.is_client_error() => ApiError::field("target", e.to_string()).into_response(),
            other => server_error(other),
        }
    }
}

fn server_error(err: ApiError) -> Response {
    let (status, code, message) = match &err {
        ApiError::Query(QueryError::BackendUnavailable(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "BACKEND_UNAVAILABLE",
            err.to_string(),
        ),
        ApiError::Query(QueryError::RenderTimeout(_)) => {
            (StatusCode::GATEWAY_TIMEOUT, "RENDER_TIMEOUT", err.to_string())
        }
        ApiError::Unsupported(_) => (StatusCode::NOT_IMPLEMENTED, "UNSUPPORTED", err.to_string()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error".to_string(),
        ),
    };

    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::error!(
        request_id = %request_id,
        error_code = %code,
        error_message = %err,
        "API error occurred"
    );

    let body = ErrorResponse {
        error: ErrorBody {
            code: code.to_string(),
            message,
        },
        request_id,
    };

    (status, Json(body)).into_response()
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
