//! Authentication errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Authentication failures surfaced by the middleware.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingAuthHeader,

    #[error("invalid authorization header")]
    InvalidAuthHeader,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("auth configuration error: {0}")]
    ConfigError(String),
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
