//! Conversation WebSocket route configuration.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::conversation::conversation_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the conversation WebSocket router
///
/// # Endpoint
///
/// `GET /converse` - WebSocket upgrade for one conversation
///
/// # Protocol
///
/// After the upgrade, clients send tagged JSON frames:
/// 1. `start` to begin the conversation
/// 2. `user_turn` frames carrying text and/or base64 audio
/// 3. `interrupt`, `playback_done`, `end` as the conversation requires
///
/// Server responds with `started`, `assistant_turn`, `speaking_started`,
/// `speaking_stopped`, `interrupted`, `ended`, and `error` frames.
///
/// # Example
///
/// ```json
/// // Client
/// {"type": "start"}
/// {"type": "user_turn", "text": "How much does shipping cost?"}
///
/// // Server
/// {"type": "started", "message": "conversation started"}
/// {"type": "speaking_started"}
/// {"type": "assistant_turn", "text": "Shipping is free over $50.", "latency_ms": 412}
/// {"type": "speaking_stopped"}
/// ```
pub fn create_conversation_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/converse", get(conversation_handler))
        .layer(TraceLayer::new_for_http())
}
