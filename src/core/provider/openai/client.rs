//! OpenAI Chat Completions provider implementation.
//!
//! One HTTPS request per dispatched turn: the full conversation history is
//! rebuilt into a message list every time (the gateway, not the API, owns
//! conversational state). The HTTP client is reused across requests for
//! connection pooling.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::config::OpenAIConfig;
use super::messages::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, OpenAIErrorResponse,
};
use crate::core::conversation::Turn;
use crate::core::provider::base::{BaseProvider, ProviderError, ProviderResult, Reply};

/// Connect timeout for the underlying HTTP client. Overall request deadlines
/// are enforced by the session, not here.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI Chat Completions client implementing [`BaseProvider`].
#[derive(Debug)]
pub struct OpenAIProvider {
    config: OpenAIConfig,
    http_client: Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> ProviderResult<Self> {
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Flatten the conversation history plus the new turn into the API's
    /// message list, with the configured system prompt first.
    fn build_messages(&self, context: &[Turn], turn: &Turn) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(ChatMessage::new("system", prompt.clone()));
        }
        for prior in context {
            messages.push(ChatMessage::new(prior.role.to_string(), prior.content.clone()));
        }
        messages.push(ChatMessage::new(turn.role.to_string(), turn.content.clone()));
        messages
    }
}

#[async_trait]
impl BaseProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn submit_turn(&self, context: &[Turn], turn: &Turn) -> ProviderResult<Reply> {
        if turn.content.is_empty() {
            // This adapter speaks the text contract only; opaque audio
            // without a transcript has nothing to submit.
            return Err(ProviderError::InvalidRequest(
                "openai provider requires text content on the turn".to_string(),
            ));
        }

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(context, turn),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            model = %self.config.model,
            history_len = context.len(),
            "Dispatching turn to OpenAI"
        );

        let response = self
            .http_client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.clone());
            warn!(status = %status, message = %message, "OpenAI request failed");

            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ProviderError::AuthenticationFailed(message)
                }
                StatusCode::BAD_REQUEST => ProviderError::InvalidRequest(message),
                _ => ProviderError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::Api {
                status: status.as_u16(),
                message: format!("unparseable completion response: {e}"),
            }
        })?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Api {
                status: status.as_u16(),
                message: "completion response contained no choices".to_string(),
            })?;

        Ok(Reply::text(text))
    }
}
