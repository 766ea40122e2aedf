//! OpenAI Chat Completions provider.

mod client;
mod config;
mod messages;

pub use client::OpenAIProvider;
pub use config::{OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL, OpenAIConfig};
pub use messages::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
