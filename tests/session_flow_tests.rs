//! Session flow tests
//!
//! Drives a [`Session`] through the turn-taking protocol end to end with
//! scripted and mock providers: the start/turn/interrupt/end lifecycle,
//! natural interruption ordering, stale-reply suppression, provider
//! failures, and speaking-completion policies. Time is paused so provider
//! delays and speaking timers run instantly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_gateway::core::conversation::{
    ClientEvent, MessageRoute, ServerEvent, Session, SessionConfig, SessionSignal,
    SpeakingDonePolicy, Turn, TurnState,
};
use parley_gateway::core::provider::{
    BaseProvider, ProviderError, ProviderResult, Reply, ScriptedProvider,
};

// =============================================================================
// Mock providers
// =============================================================================

/// Echoes the submitted turn after a fixed delay, so tests can correlate
/// replies with the turns that produced them.
#[derive(Debug)]
struct EchoProvider {
    delay: Duration,
}

#[async_trait]
impl BaseProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn submit_turn(&self, _context: &[Turn], turn: &Turn) -> ProviderResult<Reply> {
        tokio::time::sleep(self.delay).await;
        Ok(Reply::text(format!("echo: {}", turn.content)))
    }
}

/// Always fails.
#[derive(Debug)]
struct FailingProvider;

#[async_trait]
impl BaseProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn submit_turn(&self, _context: &[Turn], _turn: &Turn) -> ProviderResult<Reply> {
        Err(ProviderError::Api {
            status: 500,
            message: "upstream exploded".to_string(),
        })
    }
}

/// Never replies; exercises the session-side timeout.
#[derive(Debug)]
struct StallProvider;

#[async_trait]
impl BaseProvider for StallProvider {
    fn name(&self) -> &'static str {
        "stall"
    }

    async fn submit_turn(&self, _context: &[Turn], _turn: &Turn) -> ProviderResult<Reply> {
        futures::future::pending().await
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    session: Session,
    outbound_rx: mpsc::Receiver<MessageRoute>,
    signal_rx: mpsc::Receiver<SessionSignal>,
}

impl Harness {
    fn new(provider: Arc<dyn BaseProvider>, config: SessionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (signal_tx, signal_rx) = mpsc::channel(64);
        let session = Session::new(Uuid::new_v4(), provider, outbound_tx, signal_tx, config);
        Self {
            session,
            outbound_rx,
            signal_rx,
        }
    }

    fn scripted() -> Self {
        Self::new(Arc::new(ScriptedProvider::new()), SessionConfig::default())
    }

    async fn inbound(&mut self, event: ClientEvent) {
        self.session.handle_inbound(event).await;
    }

    async fn user_turn(&mut self, text: &str) {
        self.inbound(ClientEvent::UserTurn {
            text: Some(text.to_string()),
            audio: None,
            mime_type: None,
        })
        .await;
    }

    /// Wait for the next completion signal and apply it. Paused-time
    /// auto-advance makes provider delays and speaking timers fire
    /// immediately once every task is blocked.
    async fn pump_signal(&mut self) {
        let signal = tokio::time::timeout(Duration::from_secs(120), self.signal_rx.recv())
            .await
            .expect("no completion signal arrived")
            .expect("signal channel closed");
        self.session.handle_signal(signal).await;
    }

    /// Collect every outbound event emitted so far.
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(route) = self.outbound_rx.try_recv() {
            if let MessageRoute::Outgoing(event) = route {
                events.push(event);
            }
        }
        events
    }
}

fn assert_single_error(events: &[ServerEvent]) {
    assert_eq!(events.len(), 1, "expected one event, got {events:?}");
    assert!(matches!(events[0], ServerEvent::Error { .. }));
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn scenario_a_start_is_acknowledged() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;

    let events = h.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::Started { .. }));
    assert_eq!(h.session.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_turn_produces_assistant_reply() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;
    h.user_turn("what's the price?").await;
    h.pump_signal().await;

    let events = h.drain();
    assert!(matches!(events[0], ServerEvent::Started { .. }));
    assert!(matches!(events[1], ServerEvent::SpeakingStarted));
    match &events[2] {
        ServerEvent::AssistantTurn { text, .. } => assert!(!text.is_empty()),
        other => panic!("expected assistant_turn, got {other:?}"),
    }

    // user turn + assistant turn
    assert_eq!(h.session.context_len(), 2);
    assert_eq!(h.session.state(), TurnState::Speaking);

    // Estimated speaking window elapses, the floor is yielded.
    h.pump_signal().await;
    let events = h.drain();
    assert_eq!(events, vec![ServerEvent::SpeakingStopped]);
    assert_eq!(h.session.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_rapid_second_turn_interrupts_first() {
    let mut h = Harness::new(
        Arc::new(EchoProvider {
            delay: Duration::from_secs(1),
        }),
        SessionConfig::default(),
    );
    h.inbound(ClientEvent::Start).await;
    h.user_turn("A").await;
    h.user_turn("B").await;

    let events = h.drain();
    assert!(matches!(events[0], ServerEvent::Started { .. }));
    assert!(matches!(events[1], ServerEvent::SpeakingStarted));
    assert!(matches!(events[2], ServerEvent::Interrupted { .. }));
    assert!(matches!(events[3], ServerEvent::SpeakingStarted));

    // Both provider calls complete; only B's reply may be delivered.
    h.pump_signal().await;
    h.pump_signal().await;

    let events = h.drain();
    let replies: Vec<&ServerEvent> = events
        .iter()
        .filter(|e| matches!(e, ServerEvent::AssistantTurn { .. }))
        .collect();
    assert_eq!(replies.len(), 1, "exactly one assistant_turn: {events:?}");
    match replies[0] {
        ServerEvent::AssistantTurn { text, .. } => assert_eq!(text, "echo: B"),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn scenario_d_user_turn_before_start_is_protocol_error() {
    let mut h = Harness::scripted();
    h.user_turn("too early").await;

    assert_single_error(&h.drain());
    assert_eq!(h.session.state(), TurnState::Idle);
    assert_eq!(h.session.context_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_transport_close_mid_speaking() {
    let mut h = Harness::new(
        Arc::new(EchoProvider {
            delay: Duration::from_secs(1),
        }),
        SessionConfig::default(),
    );
    h.inbound(ClientEvent::Start).await;
    h.user_turn("hello?").await;
    h.drain();

    h.session.on_close();
    assert_eq!(h.session.state(), TurnState::Ended);
    assert_eq!(h.session.context_len(), 0);

    // The in-flight reply lands after close and must produce nothing.
    h.pump_signal().await;
    assert!(h.drain().is_empty());
}

// =============================================================================
// Turn-taking properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn explicit_interrupt_drops_in_flight_reply() {
    let mut h = Harness::new(
        Arc::new(EchoProvider {
            delay: Duration::from_secs(1),
        }),
        SessionConfig::default(),
    );
    h.inbound(ClientEvent::Start).await;
    h.user_turn("tell me a story").await;
    h.inbound(ClientEvent::Interrupt).await;

    let events = h.drain();
    assert!(matches!(events.last(), Some(ServerEvent::Interrupted { .. })));
    assert_eq!(h.session.state(), TurnState::Listening);

    h.pump_signal().await;
    assert!(h.drain().is_empty(), "stale reply must be suppressed");
    assert_eq!(h.session.context_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn context_grows_by_two_per_completed_round() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;

    for i in 0..3 {
        h.user_turn(&format!("question {i}")).await;
        h.pump_signal().await; // reply
        h.pump_signal().await; // speaking window elapses
    }

    assert_eq!(h.session.context_len(), 6);
    assert_eq!(h.session.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn seeded_greeting_makes_context_odd() {
    let mut h = Harness::new(
        Arc::new(ScriptedProvider::new()),
        SessionConfig {
            greeting: Some("Welcome to support.".to_string()),
            ..Default::default()
        },
    );
    h.inbound(ClientEvent::Start).await;

    let events = h.drain();
    match &events[0] {
        ServerEvent::Started { message } => assert_eq!(message, "Welcome to support."),
        other => panic!("expected started, got {other:?}"),
    }
    assert_eq!(h.session.context_len(), 1);

    h.user_turn("hi").await;
    h.pump_signal().await;
    assert_eq!(h.session.context_len(), 3);
}

#[tokio::test]
async fn end_is_idempotent_with_exactly_one_ack() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;
    h.inbound(ClientEvent::End).await;
    h.inbound(ClientEvent::End).await;

    let events = h.drain();
    let ended = events
        .iter()
        .filter(|e| matches!(e, ServerEvent::Ended { .. }))
        .count();
    let errors = events
        .iter()
        .filter(|e| matches!(e, ServerEvent::Error { .. }))
        .count();
    assert_eq!(ended, 1);
    assert_eq!(errors, 1);
    assert_eq!(h.session.state(), TurnState::Ended);
    assert_eq!(h.session.context_len(), 0);
}

#[tokio::test]
async fn end_from_idle_is_accepted() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::End).await;

    let events = h.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::Ended { .. }));
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn provider_failure_returns_to_listening() {
    let mut h = Harness::new(Arc::new(FailingProvider), SessionConfig::default());
    h.inbound(ClientEvent::Start).await;
    h.user_turn("hello").await;
    h.pump_signal().await;

    let events = h.drain();
    match events.last() {
        Some(ServerEvent::Error { message }) => assert!(message.contains("provider error")),
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(h.session.state(), TurnState::Listening);

    // The conversation continues: a retry succeeds structurally.
    h.user_turn("hello again").await;
    assert_eq!(h.session.state(), TurnState::Speaking);
}

#[tokio::test(start_paused = true)]
async fn provider_timeout_behaves_like_failure() {
    let mut h = Harness::new(
        Arc::new(StallProvider),
        SessionConfig {
            provider_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    );
    h.inbound(ClientEvent::Start).await;
    h.user_turn("anyone there?").await;
    h.pump_signal().await;

    let events = h.drain();
    match events.last() {
        Some(ServerEvent::Error { message }) => {
            assert!(message.contains("no reply within"), "got: {message}");
        }
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(h.session.state(), TurnState::Listening);
}

#[tokio::test]
async fn invalid_audio_payload_reports_without_state_change() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;
    h.drain();

    h.inbound(ClientEvent::UserTurn {
        text: None,
        audio: Some("!!not-base64!!".to_string()),
        mime_type: Some("audio/pcm".to_string()),
    })
    .await;

    assert_single_error(&h.drain());
    assert_eq!(h.session.state(), TurnState::Listening);
    assert_eq!(h.session.context_len(), 0);
}

#[tokio::test]
async fn empty_user_turn_is_rejected() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;
    h.drain();

    h.inbound(ClientEvent::UserTurn {
        text: None,
        audio: None,
        mime_type: None,
    })
    .await;

    assert_single_error(&h.drain());
    assert_eq!(h.session.state(), TurnState::Listening);
}

// =============================================================================
// Speaking-completion policies
// =============================================================================

#[tokio::test(start_paused = true)]
async fn client_ack_policy_waits_for_playback_done() {
    let mut h = Harness::new(
        Arc::new(ScriptedProvider::new()),
        SessionConfig {
            speaking_done: SpeakingDonePolicy::ClientAck,
            ..Default::default()
        },
    );
    h.inbound(ClientEvent::Start).await;
    h.user_turn("hi").await;
    h.pump_signal().await;
    h.drain();

    // No timer under client_ack: still speaking until the client says so.
    assert_eq!(h.session.state(), TurnState::Speaking);

    h.inbound(ClientEvent::PlaybackDone).await;
    let events = h.drain();
    assert_eq!(events, vec![ServerEvent::SpeakingStopped]);
    assert_eq!(h.session.state(), TurnState::Listening);
}

#[tokio::test]
async fn playback_done_outside_speaking_is_protocol_error() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;
    h.drain();

    h.inbound(ClientEvent::PlaybackDone).await;
    assert_single_error(&h.drain());
    assert_eq!(h.session.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn interruption_cancels_speaking_timer() {
    let mut h = Harness::scripted();
    h.inbound(ClientEvent::Start).await;
    h.user_turn("first").await;
    h.pump_signal().await; // reply delivered, timer armed
    h.drain();
    assert_eq!(h.session.state(), TurnState::Speaking);

    // Interrupt while the assistant is "speaking" its delivered reply.
    h.user_turn("second").await;
    let events = h.drain();
    assert!(matches!(events[0], ServerEvent::Interrupted { .. }));

    // The cancelled timer must never emit speaking_stopped for the old
    // turn; the next signals belong to the second dispatch.
    h.pump_signal().await; // second reply
    h.pump_signal().await; // second speaking window
    let events = h.drain();
    assert!(matches!(events[0], ServerEvent::AssistantTurn { .. }));
    assert_eq!(events[1], ServerEvent::SpeakingStopped);
    assert_eq!(h.session.state(), TurnState::Listening);
}
