//! Observable session activity.
//!
//! Every session publishes a [`SessionEvent`] stream on a broadcast channel.
//! Subscribers that fall behind lose the oldest events; the session never
//! waits for them.

use tokio::sync::broadcast;

use crate::core::tts::SynthesisKind;

use super::state::SessionState;

/// Capacity of the per-session event broadcast
pub const SESSION_EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Provisional transcript
    Partial { text: String },
    /// A finished utterance was handed to the response generator
    Utterance { text: String },
    /// The response generator answered
    Reply { text: String },
    /// Caller speech interrupted an active synthesis
    BargeIn { synthesis_id: u64 },
    SynthesisStarted { synthesis_id: u64, kind: SynthesisKind },
    SynthesisFinished {
        synthesis_id: u64,
        kind: SynthesisKind,
        outcome: SynthesisOutcome,
    },
    Dtmf { digit: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Publishing side of a session's event stream
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish without waiting; dropped when nobody listens
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
