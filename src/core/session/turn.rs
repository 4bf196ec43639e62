//! Turn-taking decisions.
//!
//! The turn controller reacts to caller speech: it interrupts the agent when
//! the caller starts talking and turns each finished utterance into a reply.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::responder::{ResponderError, SharedResponder};
use crate::core::tts::{SynthesisKind, SynthesisRequest, TTSConfig};

use super::synthesis::{SynthesisController, SynthesisHandle};

/// What happened to one utterance
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The reply is being spoken
    Responding {
        reply: String,
        handle: SynthesisHandle,
    },
    /// The generator chose silence
    Silent,
    /// The generator failed; the apology is being spoken
    Apologizing {
        error: ResponderError,
        handle: SynthesisHandle,
    },
    /// The session was cancelled while the generator ran
    Cancelled,
}

pub struct TurnController {
    call_id: String,
    responder: SharedResponder,
    synthesis: Arc<SynthesisController>,
    voice: TTSConfig,
    fallback_text: String,
}

impl TurnController {
    pub fn new(
        call_id: impl Into<String>,
        responder: SharedResponder,
        synthesis: Arc<SynthesisController>,
        voice: TTSConfig,
        fallback_text: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            responder,
            synthesis,
            voice,
            fallback_text: fallback_text.into(),
        }
    }

    /// Speak `text` with the session voice, replacing any active synthesis
    pub fn speak(&self, text: impl Into<String>, kind: SynthesisKind) -> SynthesisHandle {
        self.synthesis
            .start(SynthesisRequest::new(text, kind, &self.voice))
    }

    /// Caller started talking. Cancels the active synthesis and returns its
    /// id when there was one.
    pub fn on_speech_started(&self) -> Option<u64> {
        let interrupted = self.synthesis.active_id()?;
        if self.synthesis.stop() {
            info!(call_id = %self.call_id, synthesis_id = interrupted, "Barge-in, cancelling synthesis");
            Some(interrupted)
        } else {
            None
        }
    }

    pub fn on_speech_ended(&self) {
        debug!(call_id = %self.call_id, "Caller stopped speaking");
    }

    /// Generate and speak the reply to `utterance`.
    ///
    /// The generator runs on the blocking pool; `cancel` aborts the wait.
    pub async fn on_utterance(&self, utterance: &str, cancel: &CancellationToken) -> TurnOutcome {
        info!(call_id = %self.call_id, utterance = %utterance, "Processing utterance");

        let responder = self.responder.clone();
        let text = utterance.to_string();
        let generation = tokio::task::spawn_blocking(move || responder.respond(&text));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TurnOutcome::Cancelled,
            joined = generation => joined.unwrap_or_else(|e| {
                Err(ResponderError::GenerationFailed(format!("generator task failed: {e}")))
            }),
        };

        match result {
            Ok(reply) if reply.trim().is_empty() => {
                debug!(call_id = %self.call_id, "Empty reply, staying silent");
                TurnOutcome::Silent
            }
            Ok(reply) => {
                info!(call_id = %self.call_id, reply = %reply, "Generated reply");
                let handle = self.speak(reply.clone(), SynthesisKind::Response);
                TurnOutcome::Responding { reply, handle }
            }
            Err(error) => {
                warn!(call_id = %self.call_id, error = %error, "Response generation failed");
                let handle = self.apologize();
                TurnOutcome::Apologizing { error, handle }
            }
        }
    }

    /// React to a failed synthesis: one apology unless the apology itself
    /// failed
    pub fn on_synthesis_failed(&self, kind: SynthesisKind) -> Option<SynthesisHandle> {
        match kind {
            SynthesisKind::Apology => {
                warn!(call_id = %self.call_id, "Apology synthesis failed, staying silent");
                None
            }
            SynthesisKind::Greeting | SynthesisKind::Response => Some(self.apologize()),
        }
    }

    fn apologize(&self) -> SynthesisHandle {
        self.speak(self.fallback_text.clone(), SynthesisKind::Apology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::responder::EchoResponder;
    use crate::core::transport::OutboundAudio;
    use crate::core::tts::{AudioSink, BaseTTS, SharedTTS, TTSResult};
    use crate::core::session::synthesis::SynthesisEvent;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Records request texts and streams until cancelled
    #[derive(Default)]
    struct RecordingTTS {
        config: TTSConfig,
        texts: Mutex<Vec<(SynthesisKind, String)>>,
    }

    #[async_trait]
    impl BaseTTS for RecordingTTS {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
            sink: &dyn AudioSink,
            cancel: CancellationToken,
        ) -> TTSResult<()> {
            self.texts.lock().push((request.kind, request.text.clone()));
            for _ in 0..50 {
                if cancel.is_cancelled() {
                    break;
                }
                sink.send_audio(Bytes::from_static(&[0x7F; 8])).await?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        }

        fn get_config(&self) -> &TTSConfig {
            &self.config
        }

        fn get_provider_info(&self) -> &'static str {
            "recording"
        }
    }

    struct Fixture {
        turn: TurnController,
        tts: Arc<RecordingTTS>,
        synthesis: Arc<SynthesisController>,
        _outbound: mpsc::Receiver<OutboundAudio>,
        _events: mpsc::UnboundedReceiver<SynthesisEvent>,
    }

    fn fixture(responder: SharedResponder) -> Fixture {
        let tts = Arc::new(RecordingTTS::default());
        let shared: SharedTTS = tts.clone();
        let (out_tx, out_rx) = mpsc::channel(1024);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let synthesis = Arc::new(SynthesisController::new(
            shared,
            out_tx,
            ev_tx,
            CancellationToken::new(),
        ));
        let turn = TurnController::new(
            "CA-test",
            responder,
            synthesis.clone(),
            TTSConfig::default(),
            "Sorry about that.",
        );
        Fixture {
            turn,
            tts,
            synthesis,
            _outbound: out_rx,
            _events: ev_rx,
        }
    }

    #[tokio::test]
    async fn test_hello_is_answered() {
        let f = fixture(Arc::new(EchoResponder::new()));
        let outcome = f.turn.on_utterance("hello", &CancellationToken::new()).await;

        match outcome {
            TurnOutcome::Responding { reply, .. } => {
                assert!(reply.contains("Hello! It's nice to hear from you."))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let texts = f.tts.texts.lock().clone();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, SynthesisKind::Response);
    }

    #[tokio::test]
    async fn test_empty_reply_is_silent() {
        let responder: SharedResponder = Arc::new(|_: &str| -> Result<String, ResponderError> { Ok(String::new()) });
        let f = fixture(responder);
        let outcome = f.turn.on_utterance("anything", &CancellationToken::new()).await;
        assert!(matches!(outcome, TurnOutcome::Silent));
        assert!(!f.synthesis.is_active());
    }

    #[tokio::test]
    async fn test_generator_error_apologizes() {
        let responder: SharedResponder = Arc::new(|_: &str| -> Result<String, ResponderError> {
            Err(ResponderError::Unavailable("down".to_string()))
        });
        let f = fixture(responder);
        let outcome = f.turn.on_utterance("hello", &CancellationToken::new()).await;
        assert!(matches!(outcome, TurnOutcome::Apologizing { .. }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let texts = f.tts.texts.lock().clone();
        assert_eq!(
            texts,
            vec![(SynthesisKind::Apology, "Sorry about that.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_panicking_generator_apologizes() {
        let responder: SharedResponder = Arc::new(|_: &str| -> Result<String, ResponderError> {
            panic!("generator bug")
        });
        let f = fixture(responder);
        let outcome = f.turn.on_utterance("hello", &CancellationToken::new()).await;
        assert!(matches!(outcome, TurnOutcome::Apologizing { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_scope_skips_reply() {
        let responder: SharedResponder = Arc::new(|_: &str| -> Result<String, ResponderError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok("late".to_string())
        });
        let f = fixture(responder);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = f.turn.on_utterance("hello", &cancel).await;
        assert!(matches!(outcome, TurnOutcome::Cancelled));
        assert!(!f.synthesis.is_active());
    }

    #[tokio::test]
    async fn test_speech_started_interrupts_active_synthesis() {
        let f = fixture(Arc::new(EchoResponder::new()));
        assert_eq!(f.turn.on_speech_started(), None);

        let handle = f.turn.speak("Greeting", SynthesisKind::Greeting);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.turn.on_speech_started(), Some(handle.id()));
        assert!(handle.is_cancelled());
        assert!(!f.synthesis.is_active());
    }

    #[tokio::test]
    async fn test_failed_apology_is_not_repeated() {
        let f = fixture(Arc::new(EchoResponder::new()));
        assert!(f.turn.on_synthesis_failed(SynthesisKind::Response).is_some());
        assert!(f.turn.on_synthesis_failed(SynthesisKind::Greeting).is_some());
        assert!(f.turn.on_synthesis_failed(SynthesisKind::Apology).is_none());
    }
}
