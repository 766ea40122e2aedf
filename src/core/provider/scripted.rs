//! Scripted provider for development and tests.
//!
//! Serves a fixed reply sequence round-robin, with an optional artificial
//! delay to exercise in-flight interruption paths. Needs no credentials and
//! no network, which makes it the default provider for local runs and the
//! backbone of the integration test suite.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::base::{BaseProvider, ProviderError, ProviderResult, Reply};
use crate::core::conversation::Turn;

/// Deterministic canned-reply provider.
#[derive(Debug)]
pub struct ScriptedProvider {
    replies: Vec<String>,
    delay: Option<Duration>,
    cursor: AtomicUsize,
}

impl ScriptedProvider {
    /// Provider with the default reply script and no delay.
    pub fn new() -> Self {
        Self::with_replies(vec![
            "I can help with that.".to_string(),
            "Could you tell me a bit more?".to_string(),
            "Understood. Anything else?".to_string(),
        ])
    }

    /// Provider serving exactly the given replies, round-robin.
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies,
            delay: None,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Add an artificial delay before each reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit_turn(&self, _context: &[Turn], turn: &Turn) -> ProviderResult<Reply> {
        if self.replies.is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "scripted provider has no replies".to_string(),
            ));
        }
        if turn.content.is_empty() && turn.audio.is_none() {
            return Err(ProviderError::InvalidRequest(
                "turn carries neither text nor audio".to_string(),
            ));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        Ok(Reply::text(self.replies[index].clone()))
    }
}
