//! Authentication middleware.
//!
//! Validates bearer tokens against the configured API secrets and attaches
//! an [`Auth`] context to the request. Token extraction supports two
//! sources, in priority order:
//!
//! 1. `Authorization: Bearer <token>` header (preferred)
//! 2. `?token=<token>` query parameter, for browser WebSocket clients that
//!    cannot set headers on the upgrade request

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{Auth, match_api_secret_id};
use crate::errors::auth_error::AuthError;
use crate::state::AppState;

/// Extract the auth token from the request.
fn extract_token(request: &Request) -> Result<String, AuthError> {
    if let Some(auth_header) = request.headers().get("authorization") {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;
        return auth_str
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or(AuthError::InvalidAuthHeader);
    }

    if let Some(query) = request.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "token" {
                return Ok(value.to_string());
            }
        }
    }

    Err(AuthError::MissingAuthHeader)
}

/// Validate the request's token and attach an [`Auth`] extension.
///
/// When authentication is disabled an empty context is inserted so handlers
/// that read `Extension<Auth>` keep working.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.config.auth_required {
        request.extensions_mut().insert(Auth::empty());
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    let token = extract_token(&request)?;

    match match_api_secret_id(&token, &state.config.auth_api_secrets) {
        Some(secret_id) => {
            tracing::debug!(path = %path, auth_id = %secret_id, "API secret authentication successful");
            request.extensions_mut().insert(Auth::new(secret_id));
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!(path = %path, "API secret authentication failed: token mismatch");
            Err(AuthError::Unauthorized("invalid API secret".to_string()))
        }
    }
}
