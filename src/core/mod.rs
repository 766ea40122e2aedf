//! Core relay functionality: conversation sessions and provider adapters.

pub mod conversation;
pub mod provider;

pub use conversation::*;
pub use provider::{
    BaseProvider, ProviderConfig, ProviderError, ProviderKind, ProviderResult, Reply,
    create_provider, supported_providers,
};
