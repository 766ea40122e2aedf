//! Base trait and types for generative-response providers.
//!
//! A provider is an opaque capability: given the conversation history and a
//! new user turn, produce a reply, possibly slowly. Providers are stateless
//! with respect to the gateway: all conversational state lives in the
//! session's context, which is passed in full on every call.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::conversation::Turn;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a provider call.
///
/// Provider failures never corrupt turn-taking state: the session reports
/// them on the wire and returns to listening so the user can retry.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Rate limit exceeded
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The request was rejected as malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The provider returned an unexpected API error
    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Network-level failure reaching the provider
    #[error("transport failure: {0}")]
    Transport(String),

    /// No reply within the configured bound
    #[error("no reply within {0} seconds")]
    Timeout(u64),

    /// Invalid provider configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Unknown provider name
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

// =============================================================================
// Configuration
// =============================================================================

/// Provider-agnostic configuration, resolved from server config at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model to use (provider-specific)
    #[serde(default)]
    pub model: Option<String>,

    /// Endpoint override, mainly for tests and proxies
    #[serde(default)]
    pub base_url: Option<String>,

    /// System instructions prepended to every dispatch
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Sampling temperature (provider-specific range)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Cap on reply tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

// =============================================================================
// Reply
// =============================================================================

/// A provider's reply to one dispatched turn.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Reply text
    pub text: String,
    /// Opaque audio payload, for providers that return one
    pub audio: Option<Bytes>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio: None,
        }
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for generative-response providers.
///
/// `context` is the full prior conversation in insertion order; `turn` is
/// the new user turn being answered. Implementations must not retain state
/// between calls.
#[async_trait]
pub trait BaseProvider: Send + Sync + std::fmt::Debug {
    /// Short provider name, used in logs and stats.
    fn name(&self) -> &'static str;

    /// Submit a turn and await the reply. May take arbitrarily long; the
    /// session enforces its own timeout around this call.
    async fn submit_turn(&self, context: &[Turn], turn: &Turn) -> ProviderResult<Reply>;
}
