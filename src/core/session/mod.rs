//! # Call Session
//!
//! One [`Session`] drives one phone call from connect to hang-up. It owns the
//! call's recognition stream, a [`TranscriptAccumulator`], a
//! [`TurnController`] and a [`SynthesisController`], and funnels every signal
//! (transport events, recognition events, synthesis outcomes and
//! cancellation) through a single `tokio::select!` loop.
//!
//! ```text
//!  caller audio ──► STT pipeline ──► RecognitionEvent ─┐
//!                                                      │
//!  transport events ───────────────────────────────────┤
//!                                                      ▼
//!                                              Session event loop
//!                                                      │
//!                 TranscriptAccumulator ◄──────────────┤
//!                 TurnController ──► ResponseGenerator │
//!                 SynthesisController ──► BaseTTS ─────┴──► call audio
//! ```
//!
//! The loop is observable from outside through a [`SessionHandle`]: state
//! changes on a `watch` channel and activity on a [`SessionEvent`] broadcast.

mod config;
mod events;
mod state;
mod synthesis;
mod transcript;
mod turn;


use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::responder::SharedResponder;
use crate::core::stt::{
    BaseSTT, RecognitionEvent, RecognitionReceiver, RecognitionSender, STTError,
};
use crate::core::transport::{CallConnection, TransportEvent};
use crate::core::tts::{SharedTTS, SynthesisKind};

pub use config::{DEFAULT_FALLBACK, DEFAULT_GREETING, SessionConfig};
pub use events::{EventPublisher, SESSION_EVENT_CAPACITY, SessionEvent, SynthesisOutcome};
pub use state::SessionState;
pub use synthesis::{SynthesisController, SynthesisEvent, SynthesisHandle};
pub use transcript::{TranscriptAccumulator, TranscriptSignal, UtterancePolicy};
pub use turn::{TurnController, TurnOutcome};

/// Session-level error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to create speech recognizer: {0}")]
    SttCreation(STTError),
    #[error("Failed to start speech recognition: {0}")]
    SttStart(STTError),
    #[error("Speech recognition failed: {0}")]
    SttFailed(STTError),
    #[error("Call connection already consumed by another session")]
    ConnectionConsumed,
}

/// Why a session ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller hung up or the transport went away
    Disconnected(String),
    /// The session scope was cancelled
    Cancelled,
}

/// Builds a fresh recognizer for each call
pub type SttFactory = Arc<dyn Fn() -> Result<Box<dyn BaseSTT>, STTError> + Send + Sync>;

/// Everything a session needs besides its connection
#[derive(Clone)]
pub struct SessionDeps {
    pub stt_factory: SttFactory,
    pub tts: SharedTTS,
    pub responder: SharedResponder,
    pub config: Arc<SessionConfig>,
}

/// External view of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    events: EventPublisher,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Ask the session to close. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Resolves once the session reached `Closed`
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| s.is_closed()).await;
    }
}

/// Per-call conversation driver
pub struct Session {
    id: String,
    connection: CallConnection,
    stt: Box<dyn BaseSTT>,
    tts: SharedTTS,
    responder: SharedResponder,
    config: Arc<SessionConfig>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    events: EventPublisher,
}

/// How recognizer startup ended
enum Startup {
    Connected,
    Closed(CloseReason),
    Failed(STTError),
}

/// Result of one pass through the event loop
enum Flow {
    Continue,
    Close(Result<CloseReason, SessionError>),
}

impl Session {
    /// Prepare a session for `connection`. Nothing runs until [`Session::run`].
    pub fn new(
        connection: CallConnection,
        deps: &SessionDeps,
        parent: &CancellationToken,
    ) -> Result<(Session, SessionHandle), SessionError> {
        let stt = match (deps.stt_factory)() {
            Ok(stt) => stt,
            Err(e) => {
                connection.close();
                return Err(SessionError::SttCreation(e));
            }
        };
        let id = connection.id().to_string();
        let cancel = parent.child_token();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let events = EventPublisher::new();

        let handle = SessionHandle {
            id: id.clone(),
            cancel: cancel.clone(),
            state: state_rx,
            events: events.clone(),
        };
        let session = Session {
            id,
            connection,
            stt,
            tts: deps.tts.clone(),
            responder: deps.responder.clone(),
            config: deps.config.clone(),
            cancel,
            state: state_tx,
            events,
        };
        Ok((session, handle))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drive the call until it ends. Always leaves the session `Closed`.
    pub async fn run(mut self) -> Result<CloseReason, SessionError> {
        let Some(inbound_audio) = self.connection.take_inbound_audio() else {
            self.set_state(SessionState::Closing);
            self.connection.close();
            self.set_state(SessionState::Closed);
            return Err(SessionError::ConnectionConsumed);
        };
        let Some(mut transport_events) = self.connection.take_events() else {
            self.set_state(SessionState::Closing);
            self.connection.close();
            self.set_state(SessionState::Closed);
            return Err(SessionError::ConnectionConsumed);
        };

        info!(
            call_id = %self.id,
            caller = ?self.connection.metadata().caller,
            stt = self.stt.get_provider_info(),
            tts = self.tts.get_provider_info(),
            "Session started"
        );

        let (recognition_tx, mut recognition_rx) = mpsc::unbounded_channel();
        let (synthesis_tx, mut synthesis_rx) = mpsc::unbounded_channel();
        let synthesis = Arc::new(SynthesisController::new(
            self.tts.clone(),
            self.connection.outbound(),
            synthesis_tx,
            self.cancel.child_token(),
        ));
        let turn = TurnController::new(
            self.id.clone(),
            self.responder.clone(),
            synthesis.clone(),
            self.config.tts.clone(),
            self.config.fallback_text.clone(),
        );
        let accumulator = TranscriptAccumulator::new(self.config.utterance_policy);

        // Greeting first, then recognition; the greeting plays while the
        // recognizer connects.
        self.set_state(SessionState::Greeting);
        let greeting = turn.speak(self.config.greeting_text.clone(), SynthesisKind::Greeting);
        self.publish_started(&greeting);

        let stt_scope = self.cancel.child_token();
        let startup = {
            let connect = timeout(
                self.config.stt_connect_timeout,
                self.stt.connect(recognition_tx.clone()),
            );
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break Startup::Closed(CloseReason::Cancelled),
                    event = transport_events.recv() => {
                        if let Some(reason) = on_transport_event(&self.id, &self.events, event) {
                            break Startup::Closed(reason);
                        }
                    }
                    connected = &mut connect => break match connected {
                        Ok(Ok(())) => Startup::Connected,
                        Ok(Err(e)) => Startup::Failed(e),
                        Err(_) => Startup::Failed(STTError::ConnectionFailed(
                            "timed out connecting to recognizer".to_string(),
                        )),
                    },
                }
            }
        };

        let outcome = match startup {
            Startup::Connected => {
                info!(call_id = %self.id, "Speech recognition started");
                self.set_state(SessionState::Listening);
                let pipeline = tokio::spawn(run_stt_pipeline(
                    self.id.clone(),
                    self.stt,
                    inbound_audio,
                    recognition_tx,
                    stt_scope.clone(),
                ));

                let outcome = event_loop(
                    &self.id,
                    &self.cancel,
                    &self.state,
                    &self.events,
                    &accumulator,
                    &turn,
                    &synthesis,
                    &mut transport_events,
                    &mut recognition_rx,
                    &mut synthesis_rx,
                )
                .await;

                transition(&self.state, &self.events, SessionState::Closing);
                stt_scope.cancel();
                let stop_budget = self.config.stt_stop_timeout + STT_STOP_SLACK;
                if timeout(stop_budget, pipeline).await.is_err() {
                    warn!(call_id = %self.id, "Speech recognition did not stop in time");
                }
                outcome
            }
            Startup::Closed(reason) => {
                transition(&self.state, &self.events, SessionState::Closing);
                let mut stt = self.stt;
                let _ = timeout(self.config.stt_stop_timeout, stt.disconnect()).await;
                Ok(reason)
            }
            Startup::Failed(e) => {
                error!(call_id = %self.id, error = %e, "Failed to start speech recognition");
                transition(&self.state, &self.events, SessionState::Closing);
                let mut stt = self.stt;
                let _ = timeout(self.config.stt_stop_timeout, stt.disconnect()).await;
                Err(SessionError::SttStart(e))
            }
        };

        synthesis.shutdown();
        self.connection.close();
        transition(&self.state, &self.events, SessionState::Closed);
        info!(call_id = %self.id, "Session closed");
        outcome
    }

    fn set_state(&self, next: SessionState) {
        transition(&self.state, &self.events, next);
    }

    fn publish_started(&self, handle: &SynthesisHandle) {
        self.events.publish(SessionEvent::SynthesisStarted {
            synthesis_id: handle.id(),
            kind: handle.kind(),
        });
    }
}

/// Extra time on top of the recognizer's own shutdown budget
const STT_STOP_SLACK: std::time::Duration = std::time::Duration::from_millis(500);

fn transition(
    state: &watch::Sender<SessionState>,
    events: &EventPublisher,
    next: SessionState,
) -> bool {
    let mut from = None;
    state.send_if_modified(|current| {
        if *current == next || !current.can_transition_to(next) {
            return false;
        }
        from = Some(*current);
        *current = next;
        true
    });
    match from {
        Some(from) => {
            debug!(from = %from, to = %next, "Session state changed");
            events.publish(SessionEvent::StateChanged { from, to: next });
            true
        }
        None => false,
    }
}

/// Apply one transport event. Returns why the call ended, if it did.
fn on_transport_event(
    call_id: &str,
    events: &EventPublisher,
    event: Option<TransportEvent>,
) -> Option<CloseReason> {
    match event {
        Some(TransportEvent::Disconnected { reason }) => {
            info!(call_id = %call_id, reason = %reason, "Call disconnected");
            Some(CloseReason::Disconnected(reason))
        }
        Some(TransportEvent::Mark { name }) => {
            debug!(call_id = %call_id, mark = %name, "Playback mark reached");
            None
        }
        Some(TransportEvent::Dtmf { digit }) => {
            info!(call_id = %call_id, digit = %digit, "DTMF received");
            events.publish(SessionEvent::Dtmf { digit });
            None
        }
        None => {
            info!(call_id = %call_id, "Transport event stream ended");
            Some(CloseReason::Disconnected("transport closed".to_string()))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn event_loop(
    call_id: &str,
    cancel: &CancellationToken,
    state: &watch::Sender<SessionState>,
    events: &EventPublisher,
    accumulator: &TranscriptAccumulator,
    turn: &TurnController,
    synthesis: &SynthesisController,
    transport_events: &mut mpsc::Receiver<TransportEvent>,
    recognition: &mut RecognitionReceiver,
    synthesis_events: &mut mpsc::UnboundedReceiver<SynthesisEvent>,
) -> Result<CloseReason, SessionError> {
    let ctx = LoopContext {
        call_id,
        cancel,
        state,
        events,
        accumulator,
        turn,
        synthesis,
    };
    let mut idle_deadline: Option<Instant> = None;

    loop {
        let flow = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(call_id = %call_id, "Session cancelled");
                Flow::Close(Ok(CloseReason::Cancelled))
            }

            event = transport_events.recv() => match on_transport_event(call_id, events, event) {
                Some(reason) => Flow::Close(Ok(reason)),
                None => Flow::Continue,
            },

            Some(event) = recognition.recv() => {
                ctx.on_recognition(event, &mut idle_deadline, transport_events).await
            }

            Some(event) = synthesis_events.recv() => {
                ctx.on_synthesis(event);
                Flow::Continue
            }

            _ = sleep_until(idle_deadline.unwrap_or_else(Instant::now)), if idle_deadline.is_some() => {
                idle_deadline = None;
                match accumulator.flush() {
                    Some(utterance) => ctx.on_utterance(utterance, transport_events).await,
                    None => Flow::Continue,
                }
            }
        };

        if let Flow::Close(outcome) = flow {
            return outcome;
        }
    }
}

struct LoopContext<'a> {
    call_id: &'a str,
    cancel: &'a CancellationToken,
    state: &'a watch::Sender<SessionState>,
    events: &'a EventPublisher,
    accumulator: &'a TranscriptAccumulator,
    turn: &'a TurnController,
    synthesis: &'a SynthesisController,
}

impl LoopContext<'_> {
    async fn on_recognition(
        &self,
        event: RecognitionEvent,
        idle_deadline: &mut Option<Instant>,
        transport_events: &mut mpsc::Receiver<TransportEvent>,
    ) -> Flow {
        if let RecognitionEvent::SpeechStarted = event
            && let Some(synthesis_id) = self.turn.on_speech_started()
        {
            self.events.publish(SessionEvent::BargeIn { synthesis_id });
        }

        let signal = self.accumulator.on_event(&event);

        match &event {
            RecognitionEvent::Final(_) => {
                if let Some(idle) = self.accumulator.idle_timeout() {
                    *idle_deadline = self
                        .accumulator
                        .has_pending()
                        .then(|| Instant::now() + idle);
                }
            }
            RecognitionEvent::SpeechEnded => {
                self.turn.on_speech_ended();
                *idle_deadline = None;
            }
            RecognitionEvent::Error(e) if e.is_fatal() => {
                error!(call_id = %self.call_id, error = %e, "Speech recognition stream lost");
                return Flow::Close(Err(SessionError::SttFailed(e.clone())));
            }
            RecognitionEvent::Error(e) => {
                warn!(call_id = %self.call_id, error = %e, "Speech recognition error");
            }
            RecognitionEvent::Interim(_) | RecognitionEvent::SpeechStarted => {}
        }

        match signal {
            Some(TranscriptSignal::Partial(text)) => {
                debug!(call_id = %self.call_id, partial = %text, "Interim transcript");
                self.events.publish(SessionEvent::Partial { text });
                Flow::Continue
            }
            Some(TranscriptSignal::UtteranceReady(text)) => {
                self.on_utterance(text, transport_events).await
            }
            None => Flow::Continue,
        }
    }

    /// Hand `text` to the turn controller. A hang-up while the reply is
    /// being generated ends the session and drops the reply.
    async fn on_utterance(
        &self,
        text: String,
        transport_events: &mut mpsc::Receiver<TransportEvent>,
    ) -> Flow {
        self.events
            .publish(SessionEvent::Utterance { text: text.clone() });

        let turn = self.turn.on_utterance(&text, self.cancel);
        tokio::pin!(turn);
        let outcome = loop {
            tokio::select! {
                biased;
                event = transport_events.recv() => {
                    if let Some(reason) = on_transport_event(self.call_id, self.events, event) {
                        return Flow::Close(Ok(reason));
                    }
                }
                outcome = &mut turn => break outcome,
            }
        };

        match outcome {
            TurnOutcome::Responding { reply, handle } => {
                self.events.publish(SessionEvent::Reply { text: reply });
                self.on_started(&handle);
            }
            TurnOutcome::Apologizing { handle, .. } => self.on_started(&handle),
            TurnOutcome::Silent => {}
            TurnOutcome::Cancelled => return Flow::Close(Ok(CloseReason::Cancelled)),
        }
        Flow::Continue
    }

    fn on_synthesis(&self, event: SynthesisEvent) {
        let (id, kind) = (event.id(), event.kind());
        let outcome = match &event {
            SynthesisEvent::Completed { .. } => SynthesisOutcome::Completed,
            SynthesisEvent::Cancelled { .. } => SynthesisOutcome::Cancelled,
            SynthesisEvent::Failed { .. } => SynthesisOutcome::Failed,
        };
        self.events.publish(SessionEvent::SynthesisFinished {
            synthesis_id: id,
            kind,
            outcome,
        });

        if let SynthesisEvent::Failed { error, .. } = &event {
            warn!(call_id = %self.call_id, synthesis_id = id, kind = %kind, error = %error, "Synthesis abandoned");
            if let Some(apology) = self.turn.on_synthesis_failed(kind) {
                self.on_started(&apology);
                return;
            }
        }

        if !self.synthesis.is_active() {
            transition(self.state, self.events, SessionState::Listening);
        }
    }

    fn on_started(&self, handle: &SynthesisHandle) {
        self.events.publish(SessionEvent::SynthesisStarted {
            synthesis_id: handle.id(),
            kind: handle.kind(),
        });
        transition(self.state, self.events, SessionState::Responding);
    }
}

/// Pump caller audio into the recognizer until the stream ends or `stop`
/// fires, then disconnect it.
async fn run_stt_pipeline(
    call_id: String,
    mut stt: Box<dyn BaseSTT>,
    mut audio: mpsc::Receiver<Bytes>,
    events: RecognitionSender,
    stop: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            chunk = audio.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            debug!(call_id = %call_id, "Inbound audio ended");
            break;
        };

        let sent = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            sent = stt.send_audio(chunk) => sent,
        };
        if let Err(e) = sent {
            if e.is_fatal() {
                let _ = events.send(RecognitionEvent::Error(e));
                break;
            }
            warn!(call_id = %call_id, error = %e, "Dropped audio chunk");
        }
    }

    if let Err(e) = stt.disconnect().await {
        warn!(call_id = %call_id, error = %e, "Speech recognition did not stop cleanly");
    }
    debug!(call_id = %call_id, "Speech recognition pipeline stopped");
}
