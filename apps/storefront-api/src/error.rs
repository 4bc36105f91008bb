//! Error types for the Storefront API.
//!
//! Every failure leaves the server as `{ "code": "...", "message": "..." }`
//! with a status picked from the error's kind:
//!
//! ```text
//! CoreError::kind()          HTTP
//! ─────────────────          ────
//! Validation / Eligibility   400
//! Forbidden                  403
//! NotFound                   404
//! Conflict                   409
//! Transition                 422
//! Integrity                  500
//! ```
//!
//! Storage errors wrapping a domain error map like the domain error. Any
//! other storage failure is a 500 whose details stay in the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use storefront_core::{CoreError, ErrorKind, ValidationError};
use storefront_db::DbError;

/// API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    /// The body could not be read as the expected JSON.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Identity headers missing or unreadable.
    #[error("Authentication required: {0}")]
    Unauthenticated(String),
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Core(err.into())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Core(err) => core_status(err),
            ApiError::Db(DbError::Domain(err)) => core_status(err),
            ApiError::Db(DbError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Db(DbError::UniqueViolation { .. }) => (StatusCode::CONFLICT, "DUPLICATE"),
            ApiError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "INVALID_BODY"),
            ApiError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
        }
    }
}

fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    let status = match err.kind() {
        ErrorKind::Validation | ErrorKind::Eligibility => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transition => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.code())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status.is_server_error() {
            error!(error = %self, code, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
