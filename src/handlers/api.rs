//! REST handlers: health check and session stats.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::state::AppState;

/// Public health check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "parley-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Active-session statistics. Auth-protected.
pub async fn session_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "active_sessions": state.sessions.len(),
        "ws_connections": state.ws_connection_count(),
        "provider": state.provider.name(),
    }))
}
