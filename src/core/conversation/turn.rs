//! Conversation turns and the per-session conversation context.
//!
//! A turn is one unit of conversational content from either side. Turns are
//! immutable once appended to the context; their insertion order is the
//! conversation history handed to the provider on every dispatch.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

/// Role of the speaker for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    /// Content produced by the connected user
    User,
    /// Content produced by the generative-response provider
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One unit of conversational content.
///
/// The optional `audio` payload is opaque: the gateway never inspects it,
/// it is only carried through for provider contracts that accept audio.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Who produced this turn
    pub role: TurnRole,
    /// Text content of the turn
    pub content: String,
    /// Opaque audio bytes attached to the turn, if any
    pub audio: Option<Bytes>,
    /// Declared media type of the audio payload
    pub mime_type: Option<String>,
    /// Wall-clock time the turn was appended
    pub timestamp: DateTime<Utc>,
    /// Dispatch-to-reply processing time; assistant turns only
    pub latency_ms: Option<u64>,
}

impl Turn {
    /// Create a user turn.
    pub fn user(content: String, audio: Option<Bytes>, mime_type: Option<String>) -> Self {
        Self {
            role: TurnRole::User,
            content,
            audio,
            mime_type,
            timestamp: Utc::now(),
            latency_ms: None,
        }
    }

    /// Create an assistant turn with its measured reply latency.
    pub fn assistant(content: String, audio: Option<Bytes>, latency_ms: Option<u64>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content,
            audio,
            mime_type: None,
            timestamp: Utc::now(),
            latency_ms,
        }
    }
}

/// Ordered, append-only sequence of turns for one session.
///
/// The context is the provider's conversation history: the provider keeps no
/// memory of prior calls, so the session passes the full context on every
/// dispatch. Turns are never edited or reordered after insertion; the only
/// destructive operation is `clear`, which runs on session end.
#[derive(Debug, Default)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Insertion order is significant.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    /// Clone the current history for a provider dispatch task.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Discard the history. Only valid on session end.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
