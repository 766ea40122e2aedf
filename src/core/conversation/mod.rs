//! Conversation session core: wire protocol, turn-taking state machine,
//! session orchestration, and the connection registry.
//!
//! # Architecture
//!
//! - [`protocol`] - tagged-frame codec between raw text frames and typed
//!   events; no dependencies.
//! - [`TurnController`] - pure state machine deciding whose turn it is.
//! - [`Session`] - one per connection; applies controller decisions, owns
//!   the conversation context, and dispatches to the provider.
//! - [`SessionRegistry`] - process-wide connection to session map.

mod controller;
pub mod protocol;
mod registry;
mod session;
mod turn;

pub use controller::{
    ProtocolError, ReplyDisposition, TurnAcceptance, TurnController, TurnState,
};
pub use protocol::{ClientEvent, DecodeError, MessageRoute, ServerEvent};
pub use registry::{RegistryError, SessionHandle, SessionRegistry};
pub use session::{
    DEFAULT_PROVIDER_TIMEOUT_SECS, Session, SessionConfig, SessionSignal, SpeakingDonePolicy,
};
pub use turn::{ConversationContext, Turn, TurnRole};
