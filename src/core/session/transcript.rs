//! Utterance assembly from recognition events.

use std::time::Duration;

use parking_lot::Mutex;

use crate::core::stt::RecognitionEvent;

/// When a pending transcript becomes an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UtterancePolicy {
    /// Every final segment is its own utterance
    #[default]
    PerFinal,
    /// Join consecutive finals with a space; flush on `SpeechEnded` or after
    /// `idle` without a new final
    Coalesce { idle: Duration },
}

/// Output of [`TranscriptAccumulator::on_event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSignal {
    /// New provisional hint; the pending buffer is untouched
    Partial(String),
    /// A complete utterance, trimmed and non-empty
    UtteranceReady(String),
}

#[derive(Debug, Default)]
struct TranscriptBuffer {
    pending: String,
}

impl TranscriptBuffer {
    fn take_utterance(&mut self) -> Option<String> {
        let text = self.pending.trim().to_string();
        self.pending.clear();
        (!text.is_empty()).then_some(text)
    }
}

/// Merges interim and final recognition events into utterances.
///
/// One accumulator per session. The buffer sits behind a mutex so the idle
/// flush and the event path can both reach it.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    policy: UtterancePolicy,
    buffer: Mutex<TranscriptBuffer>,
}

impl TranscriptAccumulator {
    pub fn new(policy: UtterancePolicy) -> Self {
        Self {
            policy,
            buffer: Mutex::new(TranscriptBuffer::default()),
        }
    }

    /// Idle flush delay, when the policy has one
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.policy {
            UtterancePolicy::PerFinal => None,
            UtterancePolicy::Coalesce { idle } => Some(idle),
        }
    }

    pub fn on_event(&self, event: &RecognitionEvent) -> Option<TranscriptSignal> {
        let mut buffer = self.buffer.lock();
        match event {
            RecognitionEvent::Interim(text) => Some(TranscriptSignal::Partial(text.clone())),
            RecognitionEvent::Final(text) => match self.policy {
                UtterancePolicy::PerFinal => {
                    buffer.pending.push_str(text);
                    buffer.take_utterance().map(TranscriptSignal::UtteranceReady)
                }
                UtterancePolicy::Coalesce { .. } => {
                    let segment = text.trim();
                    if !segment.is_empty() {
                        if !buffer.pending.is_empty() {
                            buffer.pending.push(' ');
                        }
                        buffer.pending.push_str(segment);
                    }
                    None
                }
            },
            RecognitionEvent::SpeechEnded => match self.policy {
                UtterancePolicy::PerFinal => None,
                UtterancePolicy::Coalesce { .. } => {
                    buffer.take_utterance().map(TranscriptSignal::UtteranceReady)
                }
            },
            RecognitionEvent::SpeechStarted | RecognitionEvent::Error(_) => None,
        }
    }

    /// Emit whatever is pending as an utterance and clear the buffer
    pub fn flush(&self) -> Option<String> {
        self.buffer.lock().take_utterance()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.lock().pending.trim().is_empty()
    }
}
