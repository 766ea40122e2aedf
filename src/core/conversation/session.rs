//! Session orchestration for one connection.
//!
//! A session owns one [`TurnController`], the conversation context, a
//! provider handle, and the connection's outbound channel. `handle_inbound`
//! is the single entry point for client events and is synchronous with
//! respect to state: the controller transition is applied before any
//! asynchronous provider work starts, so a second rapid event is always
//! evaluated against post-transition state. Provider calls and speaking
//! timers run in spawned tasks and report back through [`SessionSignal`]s
//! that the connection loop feeds to `handle_signal`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::controller::{ProtocolError, ReplyDisposition, TurnController, TurnState};
use super::protocol::{ClientEvent, MessageRoute, ServerEvent, decode_audio};
use super::turn::{ConversationContext, Turn};
use crate::core::provider::{BaseProvider, ProviderResult, Reply};

/// Default dispatch-to-reply bound before a provider call counts as failed
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Default speaking-duration estimate per reply character
const DEFAULT_MS_PER_CHAR: u64 = 40;

/// Default floor for the speaking-duration estimate
const DEFAULT_MIN_SPEAK_MS: u64 = 800;

/// Default ceiling for the speaking-duration estimate
const DEFAULT_MAX_SPEAK_MS: u64 = 15_000;

// =============================================================================
// Speaking-completion policy
// =============================================================================

/// How the gateway learns that assistant playback has finished.
///
/// `estimated` keeps the server self-contained: a timer sized from the reply
/// length fires the speaking-finished transition unless an interruption
/// preempts it. `client_ack` hands the decision to the audio collaborator,
/// which sends `playback_done` when real playback completes. A
/// `playback_done` frame is honored under either policy; the playback side
/// always knows best.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpeakingDonePolicy {
    /// Server-side timer sized from the reply text length
    Estimated {
        /// Estimated speech duration per character (ms)
        #[serde(default)]
        ms_per_char: Option<u64>,
        /// Lower bound on the estimate (ms)
        #[serde(default)]
        min_ms: Option<u64>,
        /// Upper bound on the estimate (ms)
        #[serde(default)]
        max_ms: Option<u64>,
    },
    /// Wait for the client's `playback_done` frame
    ClientAck,
}

impl Default for SpeakingDonePolicy {
    fn default() -> Self {
        SpeakingDonePolicy::Estimated {
            ms_per_char: None,
            min_ms: None,
            max_ms: None,
        }
    }
}

impl SpeakingDonePolicy {
    /// Speaking duration to schedule for a reply, or None when completion
    /// comes from the client.
    pub fn estimate(&self, text_len: usize) -> Option<Duration> {
        match self {
            SpeakingDonePolicy::ClientAck => None,
            SpeakingDonePolicy::Estimated {
                ms_per_char,
                min_ms,
                max_ms,
            } => {
                let per_char = ms_per_char.unwrap_or(DEFAULT_MS_PER_CHAR);
                let min = min_ms.unwrap_or(DEFAULT_MIN_SPEAK_MS);
                let max = max_ms.unwrap_or(DEFAULT_MAX_SPEAK_MS).max(min);
                let estimate = (text_len as u64).saturating_mul(per_char).clamp(min, max);
                Some(Duration::from_millis(estimate))
            }
        }
    }
}

// =============================================================================
// Session configuration and signals
// =============================================================================

/// Per-session knobs resolved from server configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scripted opening turn seeded into the context on `start`
    pub greeting: Option<String>,
    /// Speaking-completion policy
    pub speaking_done: SpeakingDonePolicy,
    /// Bound on each provider call
    pub provider_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: None,
            speaking_done: SpeakingDonePolicy::default(),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

/// Completion signals from spawned session tasks back into the connection
/// loop. Every signal carries the generation it was issued under; stale
/// signals are dropped by the controller.
#[derive(Debug)]
pub enum SessionSignal {
    /// A provider call finished (successfully or not)
    Reply {
        generation: u64,
        latency_ms: u64,
        outcome: ProviderResult<Reply>,
    },
    /// The estimated speaking window elapsed
    SpeakingElapsed { generation: u64 },
}

// =============================================================================
// Session
// =============================================================================

/// The stateful representation of one ongoing conversation, tied to one
/// connection. Never shared across connections.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    controller: TurnController,
    context: ConversationContext,
    provider: Arc<dyn BaseProvider>,
    outbound: mpsc::Sender<MessageRoute>,
    signals: mpsc::Sender<SessionSignal>,
    config: SessionConfig,
    speak_cancel: Option<CancellationToken>,
}

impl Session {
    pub fn new(
        id: Uuid,
        provider: Arc<dyn BaseProvider>,
        outbound: mpsc::Sender<MessageRoute>,
        signals: mpsc::Sender<SessionSignal>,
        config: SessionConfig,
    ) -> Self {
        Self {
            id,
            controller: TurnController::new(),
            context: ConversationContext::new(),
            provider,
            outbound,
            signals,
            config,
            speak_cancel: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TurnState {
        self.controller.state()
    }

    pub fn is_ended(&self) -> bool {
        self.controller.state() == TurnState::Ended
    }

    pub fn context_len(&self) -> usize {
        self.context.len()
    }

    /// Single entry point for decoded client events.
    pub async fn handle_inbound(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Start => self.handle_start().await,
            ClientEvent::UserTurn {
                text,
                audio,
                mime_type,
            } => self.handle_user_turn(text, audio, mime_type).await,
            ClientEvent::Interrupt => self.handle_interrupt().await,
            ClientEvent::PlaybackDone => self.handle_playback_done().await,
            ClientEvent::End => self.handle_end().await,
        }
    }

    /// Apply a completion signal from a spawned task.
    pub async fn handle_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Reply {
                generation,
                latency_ms,
                outcome,
            } => self.handle_reply(generation, latency_ms, outcome).await,
            SessionSignal::SpeakingElapsed { generation } => {
                if self.controller.finish_speaking(generation) {
                    self.send(ServerEvent::SpeakingStopped).await;
                } else {
                    debug!(session_id = %self.id, generation, "Stale speaking timer ignored");
                }
            }
        }
    }

    /// Transport closed or errored: force the end transition. No outbound
    /// events; there is nobody left to send them to.
    pub fn on_close(&mut self) {
        self.cancel_speak_timer();
        if self.controller.end().is_ok() {
            debug!(session_id = %self.id, "Session force-ended on transport close");
        }
        self.context.clear();
    }

    // -------------------------------------------------------------------------
    // Inbound events
    // -------------------------------------------------------------------------

    async fn handle_start(&mut self) {
        match self.controller.start() {
            Ok(()) => {
                let message = if let Some(greeting) = self.config.greeting.clone() {
                    self.context
                        .push(Turn::assistant(greeting.clone(), None, None));
                    greeting
                } else {
                    "conversation started".to_string()
                };
                self.send(ServerEvent::Started { message }).await;
            }
            Err(e) => self.report_protocol_error(e).await,
        }
    }

    async fn handle_user_turn(
        &mut self,
        text: Option<String>,
        audio: Option<String>,
        mime_type: Option<String>,
    ) {
        // Decode the opaque payload before touching any state, so a bad
        // frame leaves the controller exactly where it was.
        let audio = match audio.as_deref().map(decode_audio).transpose() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.send(ServerEvent::Error {
                    message: e.to_string(),
                })
                .await;
                return;
            }
        };

        let content = text.unwrap_or_default();
        if content.is_empty() && audio.is_none() {
            self.send(ServerEvent::Error {
                message: "user_turn requires text or audio".to_string(),
            })
            .await;
            return;
        }

        let acceptance = match self.controller.accept_user_turn() {
            Ok(acceptance) => acceptance,
            Err(e) => {
                self.report_protocol_error(e).await;
                return;
            }
        };

        if acceptance.interrupted {
            // Interruption and redispatch are one atomic transition: the
            // ack goes out strictly before anything about the new turn.
            self.cancel_speak_timer();
            self.send(ServerEvent::Interrupted {
                message: "assistant turn superseded by new input".to_string(),
            })
            .await;
            self.controller.clear_pending_interrupt();
        }

        let history = self.context.snapshot();
        let turn = Turn::user(content, audio, mime_type);
        self.context.push(turn.clone());

        self.send(ServerEvent::SpeakingStarted).await;
        self.dispatch(history, turn, acceptance.generation);
    }

    async fn handle_interrupt(&mut self) {
        match self.controller.interrupt() {
            Ok(()) => {
                self.cancel_speak_timer();
                self.send(ServerEvent::Interrupted {
                    message: "assistant stopped".to_string(),
                })
                .await;
            }
            Err(e) => self.report_protocol_error(e).await,
        }
    }

    async fn handle_playback_done(&mut self) {
        match self.controller.acknowledge_playback() {
            Ok(()) => {
                self.cancel_speak_timer();
                self.send(ServerEvent::SpeakingStopped).await;
            }
            Err(e) => self.report_protocol_error(e).await,
        }
    }

    async fn handle_end(&mut self) {
        match self.controller.end() {
            Ok(()) => {
                self.cancel_speak_timer();
                self.context.clear();
                self.send(ServerEvent::Ended {
                    message: "conversation ended".to_string(),
                })
                .await;
            }
            Err(e) => self.report_protocol_error(e).await,
        }
    }

    // -------------------------------------------------------------------------
    // Provider dispatch and completion
    // -------------------------------------------------------------------------

    /// Spawn the provider call for an accepted user turn. The session is
    /// already Speaking when this runs; the spawned task only reports back.
    fn dispatch(&self, history: Vec<Turn>, turn: Turn, generation: u64) {
        let provider = Arc::clone(&self.provider);
        let signals = self.signals.clone();
        let timeout = self.config.provider_timeout;
        let session_id = self.id;

        tokio::spawn(async move {
            let dispatched = Instant::now();
            let outcome =
                match tokio::time::timeout(timeout, provider.submit_turn(&history, &turn)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(%session_id, generation, "Provider call timed out");
                        Err(crate::core::provider::ProviderError::Timeout(
                            timeout.as_secs(),
                        ))
                    }
                };
            let latency_ms = dispatched.elapsed().as_millis() as u64;

            // Receiver gone means the connection already closed; fine.
            let _ = signals
                .send(SessionSignal::Reply {
                    generation,
                    latency_ms,
                    outcome,
                })
                .await;
        });
    }

    async fn handle_reply(
        &mut self,
        generation: u64,
        latency_ms: u64,
        outcome: ProviderResult<Reply>,
    ) {
        match outcome {
            Ok(reply) => match self.controller.reply_arrived(generation) {
                ReplyDisposition::Deliver => {
                    let text_len = reply.text.len();
                    self.context.push(Turn::assistant(
                        reply.text.clone(),
                        reply.audio,
                        Some(latency_ms),
                    ));
                    self.send(ServerEvent::AssistantTurn {
                        text: reply.text,
                        latency_ms,
                    })
                    .await;
                    self.start_speak_timer(text_len, generation);
                }
                ReplyDisposition::Stale => {
                    debug!(
                        session_id = %self.id,
                        generation,
                        latency_ms,
                        "Dropping stale provider reply"
                    );
                }
            },
            Err(err) => {
                if self.controller.fail_speaking(generation) {
                    warn!(session_id = %self.id, error = %err, "Provider call failed");
                    self.send(ServerEvent::Error {
                        message: format!("provider error: {err}"),
                    })
                    .await;
                } else {
                    debug!(
                        session_id = %self.id,
                        generation,
                        error = %err,
                        "Dropping stale provider failure"
                    );
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Speaking timer
    // -------------------------------------------------------------------------

    fn start_speak_timer(&mut self, text_len: usize, generation: u64) {
        let Some(duration) = self.config.speaking_done.estimate(text_len) else {
            // client_ack policy: completion arrives as a playback_done frame
            return;
        };

        let token = CancellationToken::new();
        let child = token.clone();
        let signals = self.signals.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    let _ = signals
                        .send(SessionSignal::SpeakingElapsed { generation })
                        .await;
                }
            }
        });
        self.speak_cancel = Some(token);
    }

    fn cancel_speak_timer(&mut self) {
        if let Some(token) = self.speak_cancel.take() {
            token.cancel();
        }
    }

    // -------------------------------------------------------------------------
    // Outbound helpers
    // -------------------------------------------------------------------------

    async fn send(&self, event: ServerEvent) {
        if self
            .outbound
            .send(MessageRoute::Outgoing(event))
            .await
            .is_err()
        {
            debug!(session_id = %self.id, "Outbound channel closed, dropping event");
        }
    }

    async fn report_protocol_error(&self, error: ProtocolError) {
        self.send(ServerEvent::Error {
            message: error.to_string(),
        })
        .await;
    }
}
