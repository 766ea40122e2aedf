//! Generative-response provider module.
//!
//! The gateway treats reply generation as an opaque capability behind the
//! [`BaseProvider`] trait: submit a turn with its conversation context,
//! await a reply. Providers are selected by name at startup through
//! [`create_provider`]; nothing else in the gateway knows which
//! implementation is running.
//!
//! # Supported Providers
//!
//! - **openai** - Chat Completions over HTTPS
//! - **scripted** - deterministic canned replies (development and tests)

mod base;
pub mod openai;
mod scripted;

pub use base::{BaseProvider, ProviderConfig, ProviderError, ProviderResult, Reply};
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use scripted::ScriptedProvider;

use std::sync::Arc;

/// Supported provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Scripted,
}

impl ProviderKind {
    /// Parse a provider name from configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAI),
            "scripted" => Some(ProviderKind::Scripted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Scripted => write!(f, "scripted"),
        }
    }
}

/// Factory: create the configured provider.
pub fn create_provider(
    provider_type: &str,
    config: ProviderConfig,
) -> ProviderResult<Arc<dyn BaseProvider>> {
    match ProviderKind::parse(provider_type) {
        Some(ProviderKind::OpenAI) => {
            let config = OpenAIConfig::from_provider_config(&config)?;
            Ok(Arc::new(OpenAIProvider::new(config)?))
        }
        Some(ProviderKind::Scripted) => Ok(Arc::new(ScriptedProvider::new())),
        None => Err(ProviderError::UnsupportedProvider(format!(
            "{provider_type} (supported: {})",
            supported_providers().join(", ")
        ))),
    }
}

/// Names accepted by [`create_provider`].
pub fn supported_providers() -> Vec<&'static str> {
    vec!["openai", "scripted"]
}
