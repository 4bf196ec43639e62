//! Streaming synthesis toward the call.
//!
//! At most one synthesis is active per session. Each one gets an id; its
//! audio frames are tagged with that id and pass through a single forwarder
//! task that only lets through frames matching the currently open gate. A
//! cancelled or superseded synthesis therefore can not leak audio into the
//! call, even if its provider keeps producing for a while.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::transport::OutboundAudio;
use crate::core::tts::{
    AudioSink, SharedTTS, SynthesisKind, SynthesisRequest, TTSError, TTSResult,
};

/// Pending frames between providers and the forwarder
const FRAME_QUEUE_SIZE: usize = 256;

/// Gate value while nothing may reach the transport
const CLOSED_GATE: u64 = 0;

/// Cancellable reference to one in-flight synthesis
#[derive(Debug, Clone)]
pub struct SynthesisHandle {
    id: u64,
    kind: SynthesisKind,
    cancel: CancellationToken,
}

impl SynthesisHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> SynthesisKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// How a synthesis ended, reported to the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Completed {
        id: u64,
        kind: SynthesisKind,
    },
    Failed {
        id: u64,
        kind: SynthesisKind,
        error: TTSError,
    },
    Cancelled {
        id: u64,
        kind: SynthesisKind,
    },
}

impl SynthesisEvent {
    pub fn id(&self) -> u64 {
        match self {
            SynthesisEvent::Completed { id, .. }
            | SynthesisEvent::Failed { id, .. }
            | SynthesisEvent::Cancelled { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> SynthesisKind {
        match self {
            SynthesisEvent::Completed { kind, .. }
            | SynthesisEvent::Failed { kind, .. }
            | SynthesisEvent::Cancelled { kind, .. } => *kind,
        }
    }
}

enum Frame {
    Audio { id: u64, chunk: Bytes },
    End { id: u64 },
    Failed { id: u64, error: TTSError },
}

struct ControllerState {
    gate: AtomicU64,
    active: Mutex<Option<SynthesisHandle>>,
    events: mpsc::UnboundedSender<SynthesisEvent>,
}

impl ControllerState {
    fn is_open_for(&self, id: u64) -> bool {
        self.gate.load(Ordering::SeqCst) == id
    }

    /// Retire `id` if it is still the active synthesis
    fn finish(&self, id: u64) -> Option<SynthesisHandle> {
        let mut active = self.active.lock();
        if active.as_ref().map(|h| h.id) != Some(id) {
            return None;
        }
        let _ = self
            .gate
            .compare_exchange(id, CLOSED_GATE, Ordering::SeqCst, Ordering::SeqCst);
        active.take()
    }
}

/// Drives at most one streaming synthesis at a time toward the transport
pub struct SynthesisController {
    tts: SharedTTS,
    state: Arc<ControllerState>,
    frames: mpsc::Sender<Frame>,
    clears: mpsc::UnboundedSender<()>,
    next_id: AtomicU64,
    scope: CancellationToken,
}

impl SynthesisController {
    /// Create the controller and spawn its forwarder.
    ///
    /// Every synthesis runs under a child of `scope`; cancelling `scope`
    /// stops all of them together with the forwarder.
    pub fn new(
        tts: SharedTTS,
        outbound: mpsc::Sender<OutboundAudio>,
        events: mpsc::UnboundedSender<SynthesisEvent>,
        scope: CancellationToken,
    ) -> Self {
        let state = Arc::new(ControllerState {
            gate: AtomicU64::new(CLOSED_GATE),
            active: Mutex::new(None),
            events,
        });
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_SIZE);
        let (clears_tx, clears_rx) = mpsc::unbounded_channel();

        tokio::spawn(forward_frames(
            state.clone(),
            frames_rx,
            clears_rx,
            outbound,
            scope.clone(),
        ));

        Self {
            tts,
            state,
            frames: frames_tx,
            clears: clears_tx,
            next_id: AtomicU64::new(1),
            scope,
        }
    }

    /// Start synthesizing `request`, cancelling whatever was active
    pub fn start(&self, request: SynthesisRequest) -> SynthesisHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = SynthesisHandle {
            id,
            kind: request.kind,
            cancel: self.scope.child_token(),
        };

        if self.scope.is_cancelled() {
            debug!(synthesis_id = id, "Synthesis requested after shutdown");
            return handle;
        }

        {
            let mut active = self.state.active.lock();
            if let Some(previous) = active.take() {
                self.retire(previous);
            }
            self.state.gate.store(id, Ordering::SeqCst);
            *active = Some(handle.clone());
        }

        debug!(
            synthesis_id = id,
            kind = %request.kind,
            chars = request.text.len(),
            "Starting synthesis"
        );

        let tts = self.tts.clone();
        let frames = self.frames.clone();
        let cancel = handle.cancel.clone();
        tokio::spawn(async move {
            let sink = TaggedSink {
                id,
                frames: frames.clone(),
                cancel: cancel.clone(),
            };
            let result = tts.synthesize(&request, &sink, cancel.clone()).await;
            if cancel.is_cancelled() {
                return;
            }
            let frame = match result {
                Ok(()) => Frame::End { id },
                Err(error) => Frame::Failed { id, error },
            };
            let _ = frames.send(frame).await;
        });

        handle
    }

    /// Cancel `handle` if it is still active. Returns whether anything was
    /// cancelled; a finished or superseded handle is a no-op.
    pub fn cancel(&self, handle: &SynthesisHandle) -> bool {
        let mut active = self.state.active.lock();
        if active.as_ref().map(|h| h.id) == Some(handle.id) {
            if let Some(current) = active.take() {
                self.retire(current);
                return true;
            }
        }
        handle.cancel.cancel();
        false
    }

    /// Cancel the active synthesis, if any
    pub fn stop(&self) -> bool {
        let mut active = self.state.active.lock();
        match active.take() {
            Some(current) => {
                self.retire(current);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.active.lock().is_some()
    }

    pub fn active_id(&self) -> Option<u64> {
        self.state.active.lock().as_ref().map(|h| h.id)
    }

    /// Stop everything including the forwarder
    pub fn shutdown(&self) {
        self.stop();
        self.scope.cancel();
    }

    // Caller holds the active slot lock and has already taken `handle` out.
    fn retire(&self, handle: SynthesisHandle) {
        let _ = self.state.gate.compare_exchange(
            handle.id,
            CLOSED_GATE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        handle.cancel.cancel();
        let _ = self.clears.send(());
        let _ = self.state.events.send(SynthesisEvent::Cancelled {
            id: handle.id,
            kind: handle.kind,
        });
        debug!(synthesis_id = handle.id, kind = %handle.kind, "Synthesis cancelled");
    }
}

impl Drop for SynthesisController {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

async fn forward_frames(
    state: Arc<ControllerState>,
    mut frames: mpsc::Receiver<Frame>,
    mut clears: mpsc::UnboundedReceiver<()>,
    outbound: mpsc::Sender<OutboundAudio>,
    scope: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = scope.cancelled() => break,

            Some(()) = clears.recv() => {
                if !deliver(&outbound, OutboundAudio::Clear, &scope).await {
                    break;
                }
            }

            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                match frame {
                    Frame::Audio { id, chunk } => {
                        if state.is_open_for(id)
                            && !deliver(&outbound, OutboundAudio::Media(chunk), &scope).await
                        {
                            break;
                        }
                    }
                    Frame::End { id } => {
                        if let Some(handle) = state.finish(id) {
                            debug!(synthesis_id = id, kind = %handle.kind, "Synthesis completed");
                            let _ = state.events.send(SynthesisEvent::Completed {
                                id,
                                kind: handle.kind,
                            });
                        }
                    }
                    Frame::Failed { id, error } => {
                        if let Some(handle) = state.finish(id) {
                            warn!(synthesis_id = id, kind = %handle.kind, error = %error, "Synthesis failed");
                            let _ = state.events.send(SynthesisEvent::Failed {
                                id,
                                kind: handle.kind,
                                error,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Returns `false` once the scope is cancelled. A vanished transport is not
/// an error here; the session learns about it from the transport events.
async fn deliver(
    outbound: &mpsc::Sender<OutboundAudio>,
    audio: OutboundAudio,
    scope: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = scope.cancelled() => false,
        sent = outbound.send(audio) => {
            if sent.is_err() {
                debug!("Transport gone, dropping synthesized audio");
            }
            true
        }
    }
}

struct TaggedSink {
    id: u64,
    frames: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

#[async_trait]
impl AudioSink for TaggedSink {
    async fn send_audio(&self, chunk: Bytes) -> TTSResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TTSError::SinkClosed);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TTSError::SinkClosed),
            sent = self.frames.send(Frame::Audio { id: self.id, chunk }) => {
                sent.map_err(|_| TTSError::SinkClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::{BaseTTS, TTSConfig};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Streams `chunks` copies of the first byte of the request text
    struct ScriptedTTS {
        config: TTSConfig,
        chunks: usize,
        delay: Duration,
        fail_with: Option<TTSError>,
    }

    impl ScriptedTTS {
        fn shared(chunks: usize, delay: Duration) -> SharedTTS {
            Arc::new(Self {
                config: TTSConfig::default(),
                chunks,
                delay,
                fail_with: None,
            })
        }
    }

    #[async_trait]
    impl BaseTTS for ScriptedTTS {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
            sink: &dyn AudioSink,
            cancel: CancellationToken,
        ) -> TTSResult<()> {
            let marker = request.text.as_bytes()[0];
            for _ in 0..self.chunks {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                sink.send_audio(Bytes::from(vec![marker; 4])).await?;
                tokio::time::sleep(self.delay).await;
            }
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn get_config(&self) -> &TTSConfig {
            &self.config
        }

        fn get_provider_info(&self) -> &'static str {
            "scripted"
        }
    }

    struct Harness {
        controller: SynthesisController,
        outbound: mpsc::Receiver<OutboundAudio>,
        events: mpsc::UnboundedReceiver<SynthesisEvent>,
    }

    fn harness(tts: SharedTTS) -> Harness {
        let (out_tx, out_rx) = mpsc::channel(1024);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        Harness {
            controller: SynthesisController::new(tts, out_tx, ev_tx, CancellationToken::new()),
            outbound: out_rx,
            events: ev_rx,
        }
    }

    fn request(text: &str, kind: SynthesisKind) -> SynthesisRequest {
        SynthesisRequest::new(text, kind, &TTSConfig::default())
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<SynthesisEvent>) -> SynthesisEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timeout")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_frames_forwarded_then_completed() {
        let mut h = harness(ScriptedTTS::shared(3, Duration::from_millis(1)));
        let handle = h.controller.start(request("A", SynthesisKind::Response));
        assert!(h.controller.is_active());
        assert_eq!(h.controller.active_id(), Some(handle.id()));

        let event = next_event(&mut h.events).await;
        assert_eq!(
            event,
            SynthesisEvent::Completed {
                id: handle.id(),
                kind: SynthesisKind::Response
            }
        );
        assert!(!h.controller.is_active());

        for _ in 0..3 {
            assert_eq!(
                h.outbound.recv().await,
                Some(OutboundAudio::Media(Bytes::from_static(b"AAAA")))
            );
        }
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_start_supersedes_and_blocks_stale_frames() {
        let mut h = harness(ScriptedTTS::shared(20, Duration::from_millis(10)));
        let first = h.controller.start(request("A", SynthesisKind::Greeting));

        // Wait for the first synthesis to be audible
        assert!(matches!(
            h.outbound.recv().await,
            Some(OutboundAudio::Media(_))
        ));

        let second = h.controller.start(request("B", SynthesisKind::Response));
        assert!(first.is_cancelled());
        assert_eq!(
            next_event(&mut h.events).await,
            SynthesisEvent::Cancelled {
                id: first.id(),
                kind: SynthesisKind::Greeting
            }
        );
        assert_eq!(
            next_event(&mut h.events).await,
            SynthesisEvent::Completed {
                id: second.id(),
                kind: SynthesisKind::Response
            }
        );

        let mut seen_clear = false;
        let mut after_clear = Vec::new();
        while let Ok(audio) = h.outbound.try_recv() {
            match audio {
                OutboundAudio::Clear => seen_clear = true,
                OutboundAudio::Media(chunk) if seen_clear => after_clear.push(chunk),
                OutboundAudio::Media(_) => {}
            }
        }
        assert!(seen_clear);
        assert_eq!(after_clear.len(), 20);
        assert!(after_clear.iter().all(|c| c.as_ref() == b"BBBB"));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut h = harness(ScriptedTTS::shared(100, Duration::from_millis(10)));
        let handle = h.controller.start(request("A", SynthesisKind::Response));

        assert!(h.controller.cancel(&handle));
        assert!(!h.controller.cancel(&handle));
        assert!(!h.controller.stop());
        assert!(!h.controller.is_active());

        assert!(matches!(
            next_event(&mut h.events).await,
            SynthesisEvent::Cancelled { .. }
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.events.try_recv().is_err());

        let clears = std::iter::from_fn(|| h.outbound.try_recv().ok())
            .filter(|a| *a == OutboundAudio::Clear)
            .count();
        assert_eq!(clears, 1);
    }

    #[tokio::test]
    async fn test_failure_reported_once() {
        let tts: SharedTTS = Arc::new(ScriptedTTS {
            config: TTSConfig::default(),
            chunks: 1,
            delay: Duration::from_millis(1),
            fail_with: Some(TTSError::ProviderError("quota".to_string())),
        });
        let mut h = harness(tts);
        let handle = h.controller.start(request("A", SynthesisKind::Response));

        assert_eq!(
            next_event(&mut h.events).await,
            SynthesisEvent::Failed {
                id: handle.id(),
                kind: SynthesisKind::Response,
                error: TTSError::ProviderError("quota".to_string()),
            }
        );
        assert!(!h.controller.is_active());
    }

    #[tokio::test]
    async fn test_stop_without_active_sends_nothing() {
        let mut h = harness(ScriptedTTS::shared(1, Duration::from_millis(1)));
        assert!(!h.controller.stop());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.outbound.try_recv().is_err());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_inert() {
        let mut h = harness(ScriptedTTS::shared(3, Duration::from_millis(1)));
        h.controller.shutdown();
        let handle = h.controller.start(request("A", SynthesisKind::Response));
        assert!(handle.is_cancelled());
        assert!(!h.controller.is_active());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.outbound.try_recv().is_err());
    }
}
