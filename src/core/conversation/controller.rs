//! Turn-taking state machine for one conversation.
//!
//! The controller is pure: no I/O, no clocks, no channels. The session feeds
//! it inbound events and provider outcomes and executes the side effects it
//! decides on. Every assistant dispatch is tagged with a monotonically
//! increasing generation; a reply, failure, or speaking timer whose
//! generation no longer matches the current one is stale and must be
//! dropped, never delivered. That generation check is the only cancellation
//! mechanism: in-flight provider calls are never aborted, their results
//! just stop mattering.

use std::fmt;
use thiserror::Error;

/// Lifecycle state of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Connection established, `start` not yet received
    #[default]
    Idle,
    /// Session active, assistant silent, ready for a user turn
    Listening,
    /// An assistant turn is being produced or is in flight to the client
    Speaking,
    /// Terminal; no provider calls, no transitions
    Ended,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::Listening => write!(f, "listening"),
            TurnState::Speaking => write!(f, "speaking"),
            TurnState::Ended => write!(f, "ended"),
        }
    }
}

/// An inbound event that is illegal in the current state.
///
/// Protocol errors are always recovered locally: the session reports them on
/// the wire and leaves its state untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("conversation not started; send `start` first")]
    NotStarted,

    #[error("conversation already started")]
    AlreadyStarted,

    #[error("conversation has ended")]
    SessionEnded,

    #[error("no assistant turn in progress")]
    NotSpeaking,
}

/// Outcome of accepting a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnAcceptance {
    /// Generation tag for the provider dispatch this turn triggers
    pub generation: u64,
    /// Whether this turn cut off an in-progress assistant turn
    pub interrupted: bool,
}

/// What to do with a provider reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Reply belongs to the current turn; append and emit it
    Deliver,
    /// Reply belongs to a superseded turn; drop it silently
    Stale,
}

/// Pure turn-taking state machine.
#[derive(Debug, Default)]
pub struct TurnController {
    state: TurnState,
    generation: u64,
    pending_interrupt: bool,
    reply_delivered: bool,
}

impl TurnController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Generation of the most recent assistant dispatch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True between the arrival of interrupting user input and the outbound
    /// interruption acknowledgment.
    pub fn pending_interrupt(&self) -> bool {
        self.pending_interrupt
    }

    /// `start`: Idle -> Listening.
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            TurnState::Idle => {
                self.state = TurnState::Listening;
                Ok(())
            }
            TurnState::Ended => Err(ProtocolError::SessionEnded),
            TurnState::Listening | TurnState::Speaking => Err(ProtocolError::AlreadyStarted),
        }
    }

    /// `user_turn`: Listening -> Speaking, or Speaking -> Speaking under a
    /// new generation (natural interruption).
    ///
    /// The state flips on dispatch, not on reply, so a second user turn
    /// arriving before the reply reads as an interruption rather than a
    /// protocol violation. Interruption and redispatch are one atomic
    /// transition; the superseded generation's reply becomes stale here.
    pub fn accept_user_turn(&mut self) -> Result<TurnAcceptance, ProtocolError> {
        match self.state {
            TurnState::Idle => Err(ProtocolError::NotStarted),
            TurnState::Ended => Err(ProtocolError::SessionEnded),
            TurnState::Listening => {
                self.state = TurnState::Speaking;
                self.generation += 1;
                self.reply_delivered = false;
                Ok(TurnAcceptance {
                    generation: self.generation,
                    interrupted: false,
                })
            }
            TurnState::Speaking => {
                self.pending_interrupt = true;
                self.generation += 1;
                self.reply_delivered = false;
                Ok(TurnAcceptance {
                    generation: self.generation,
                    interrupted: true,
                })
            }
        }
    }

    /// Called once the interruption acknowledgment has gone out.
    pub fn clear_pending_interrupt(&mut self) {
        self.pending_interrupt = false;
    }

    /// Explicit `interrupt`: (Listening|Speaking) -> Listening. No new
    /// content, no provider dispatch; any in-flight call becomes stale.
    pub fn interrupt(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            TurnState::Idle => Err(ProtocolError::NotStarted),
            TurnState::Ended => Err(ProtocolError::SessionEnded),
            TurnState::Listening | TurnState::Speaking => {
                self.state = TurnState::Listening;
                self.generation += 1;
                self.reply_delivered = false;
                Ok(())
            }
        }
    }

    /// `end`: any non-terminal state -> Ended. Transport close takes the
    /// same path, which is why Idle is accepted too.
    pub fn end(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            TurnState::Ended => Err(ProtocolError::SessionEnded),
            _ => {
                self.state = TurnState::Ended;
                self.generation += 1;
                self.reply_delivered = false;
                self.pending_interrupt = false;
                Ok(())
            }
        }
    }

    /// A provider reply arrived for `generation`.
    pub fn reply_arrived(&mut self, generation: u64) -> ReplyDisposition {
        if self.state == TurnState::Speaking && generation == self.generation {
            self.reply_delivered = true;
            ReplyDisposition::Deliver
        } else {
            ReplyDisposition::Stale
        }
    }

    /// The speaking phase for `generation` ran to completion (timer or
    /// client acknowledgment). Returns true when the transition fired;
    /// false means it was preempted and the signal is stale.
    pub fn finish_speaking(&mut self, generation: u64) -> bool {
        if self.state == TurnState::Speaking && generation == self.generation {
            self.state = TurnState::Listening;
            self.reply_delivered = false;
            true
        } else {
            false
        }
    }

    /// The provider call for `generation` failed. The conversation returns
    /// to Listening so the user can retry; stale failures are dropped.
    pub fn fail_speaking(&mut self, generation: u64) -> bool {
        if self.state == TurnState::Speaking && generation == self.generation {
            self.state = TurnState::Listening;
            self.reply_delivered = false;
            true
        } else {
            false
        }
    }

    /// `playback_done`: the client finished playing the delivered assistant
    /// turn. Only legal while Speaking with a delivered reply.
    pub fn acknowledge_playback(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            TurnState::Idle => Err(ProtocolError::NotStarted),
            TurnState::Ended => Err(ProtocolError::SessionEnded),
            TurnState::Speaking if self.reply_delivered => {
                self.state = TurnState::Listening;
                self.reply_delivered = false;
                Ok(())
            }
            TurnState::Listening | TurnState::Speaking => Err(ProtocolError::NotSpeaking),
        }
    }
}
