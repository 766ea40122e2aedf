//! OpenAI provider configuration.

use crate::core::provider::base::{ProviderConfig, ProviderError, ProviderResult};
use crate::utils::validate_endpoint;

/// Default Chat Completions endpoint
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when none is configured
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Resolved configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAIConfig {
    /// Resolve from the provider-agnostic config, validating the endpoint
    /// and requiring an API key.
    pub fn from_provider_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::InvalidConfiguration(
                "OPENAI_API_KEY is required for the openai provider".to_string(),
            )
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string());
        validate_endpoint(&base_url)
            .map_err(|e| ProviderError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Full Chat Completions URL.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}
