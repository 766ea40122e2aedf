//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and session stats endpoints
//! - `conversation` - Conversational relay WebSocket

pub mod api;
pub mod conversation;

pub use conversation::conversation_handler;
