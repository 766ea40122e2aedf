//! Wire protocol for the conversational relay.
//!
//! Events travel as tagged JSON text frames over one persistent WebSocket.
//! Both directions are closed discriminated unions so the compiler enforces
//! exhaustive handling of every tag. Decode failures never crash a
//! connection and never touch session state: the session reports them as an
//! `error` frame and keeps going.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum allowed size for a user turn's text (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

/// Maximum allowed size for a user turn's base64 audio payload (5 MB)
pub const MAX_AUDIO_SIZE: usize = 5 * 1024 * 1024;

// =============================================================================
// Inbound Events (Client -> Server)
// =============================================================================

/// Inbound events from the client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Begin the conversation. Must precede any user turn.
    Start,

    /// One user turn: text, opaque audio, or both.
    UserTurn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Base64-encoded opaque audio payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },

    /// Explicit stop with no new content.
    Interrupt,

    /// The client finished playing the current assistant turn.
    PlaybackDone,

    /// Terminate the session.
    End,
}

// =============================================================================
// Outbound Events (Server -> Client)
// =============================================================================

/// Outbound events to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Ack of `start`; carries the greeting when one is configured.
    Started { message: String },

    /// Provider reply with its dispatch-to-reply latency.
    AssistantTurn { text: String, latency_ms: u64 },

    /// The assistant took the floor.
    SpeakingStarted,

    /// The assistant yielded the floor without interruption.
    SpeakingStopped,

    /// Interruption acknowledgment.
    Interrupted { message: String },

    /// Termination acknowledgment.
    Ended { message: String },

    /// Any failure; session state is unaffected unless noted elsewhere.
    Error { message: String },
}

/// Message routing for the per-connection sender task.
#[derive(Debug)]
pub enum MessageRoute {
    /// JSON text frame
    Outgoing(ServerEvent),
    /// Close the connection
    Close,
}

// =============================================================================
// Codec
// =============================================================================

/// Failure to turn a raw inbound frame into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unknown tag or otherwise malformed JSON
    #[error("invalid message format: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field exceeds its size cap
    #[error("{field} too large: {size} bytes (max: {max} bytes)")]
    FieldTooLarge {
        field: &'static str,
        size: usize,
        max: usize,
    },

    /// Audio payload is not valid base64
    #[error("invalid base64 audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

/// Decode one inbound text frame.
pub fn decode(raw: &str) -> Result<ClientEvent, DecodeError> {
    let event: ClientEvent = serde_json::from_str(raw)?;
    validate_size(&event)?;
    Ok(event)
}

/// Encode one outbound event as a text frame.
pub fn encode(event: &ServerEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

/// Decode a base64 audio payload into opaque bytes.
pub fn decode_audio(audio: &str) -> Result<Bytes, DecodeError> {
    Ok(Bytes::from(BASE64.decode(audio)?))
}

/// Validates field sizes to prevent resource exhaustion attacks.
fn validate_size(event: &ClientEvent) -> Result<(), DecodeError> {
    if let ClientEvent::UserTurn { text, audio, .. } = event {
        if let Some(text) = text {
            if text.len() > MAX_TEXT_SIZE {
                return Err(DecodeError::FieldTooLarge {
                    field: "text",
                    size: text.len(),
                    max: MAX_TEXT_SIZE,
                });
            }
        }
        if let Some(audio) = audio {
            if audio.len() > MAX_AUDIO_SIZE {
                return Err(DecodeError::FieldTooLarge {
                    field: "audio",
                    size: audio.len(),
                    max: MAX_AUDIO_SIZE,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_decodes() {
        let event = decode(r#"{"type": "start"}"#).expect("should decode");
        assert_eq!(event, ClientEvent::Start);
    }

    #[test]
    fn test_user_turn_decodes_with_text() {
        let event = decode(r#"{"type": "user_turn", "text": "what's the price?"}"#)
            .expect("should decode");
        match event {
            ClientEvent::UserTurn { text, audio, .. } => {
                assert_eq!(text.as_deref(), Some("what's the price?"));
                assert!(audio.is_none());
            }
            other => panic!("expected UserTurn, got {other:?}"),
        }
    }

    #[test]
    fn test_user_turn_decodes_with_audio() {
        let payload = BASE64.encode(b"opaque-pcm");
        let raw = format!(
            r#"{{"type": "user_turn", "audio": "{payload}", "mime_type": "audio/pcm"}}"#
        );
        let event = decode(&raw).expect("should decode");
        match event {
            ClientEvent::UserTurn {
                audio, mime_type, ..
            } => {
                let bytes = decode_audio(&audio.unwrap()).expect("valid base64");
                assert_eq!(&bytes[..], b"opaque-pcm");
                assert_eq!(mime_type.as_deref(), Some("audio/pcm"));
            }
            other => panic!("expected UserTurn, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_is_decode_error() {
        let err = decode(r#"{"type": "dance"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_missing_tag_is_decode_error() {
        assert!(decode(r#"{"text": "hello"}"#).is_err());
        assert!(decode("not json at all").is_err());
    }

    #[test]
    fn test_oversized_text_rejected() {
        let raw = format!(
            r#"{{"type": "user_turn", "text": "{}"}}"#,
            "a".repeat(MAX_TEXT_SIZE + 1)
        );
        let err = decode(&raw).unwrap_err();
        match err {
            DecodeError::FieldTooLarge { field, .. } => assert_eq!(field, "text"),
            other => panic!("expected FieldTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_text_at_limit_accepted() {
        let raw = format!(
            r#"{{"type": "user_turn", "text": "{}"}}"#,
            "a".repeat(MAX_TEXT_SIZE)
        );
        assert!(decode(&raw).is_ok());
    }

    #[test]
    fn test_invalid_base64_audio_rejected() {
        let err = decode_audio("!!not-base64!!").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidAudio(_)));
    }

    #[test]
    fn test_assistant_turn_encodes() {
        let frame = encode(&ServerEvent::AssistantTurn {
            text: "hello".to_string(),
            latency_ms: 42,
        })
        .expect("should encode");
        assert!(frame.contains(r#""type":"assistant_turn""#));
        assert!(frame.contains(r#""latency_ms":42"#));
    }

    #[test]
    fn test_status_events_encode_with_tag_only() {
        let frame = encode(&ServerEvent::SpeakingStarted).unwrap();
        assert_eq!(frame, r#"{"type":"speaking_started"}"#);
        let frame = encode(&ServerEvent::SpeakingStopped).unwrap();
        assert_eq!(frame, r#"{"type":"speaking_stopped"}"#);
    }

    #[test]
    fn test_error_event_encodes() {
        let frame = encode(&ServerEvent::Error {
            message: "conversation not started".to_string(),
        })
        .unwrap();
        assert!(frame.contains(r#""type":"error""#));
        assert!(frame.contains("conversation not started"));
    }
}
