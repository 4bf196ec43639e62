//! Test Fixtures Module
//!
//! Shared doubles for gateway integration tests:
//! - A recognizer driven by the test through [`SttProbe`]
//! - A synthesizer that streams tagged frames and logs every request
//! - Configuration and session dependency builders

// Not every test binary uses every fixture
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use teleagent_gateway::core::stt::RecognitionSender;
use teleagent_gateway::{
    AudioSink, BaseSTT, BaseTTS, EchoResponder, RecognitionEvent, STTConfig, STTError,
    ServerConfig, SessionConfig, SessionDeps, SharedResponder, SynthesisKind, SynthesisRequest,
    TTSConfig, TTSError, TTSResult,
};

// =============================================================================
// Recognizer
// =============================================================================

/// Lets a test speak on behalf of the recognizer of every call it creates
#[derive(Clone, Default)]
pub struct SttProbe {
    events: Arc<Mutex<Vec<RecognitionSender>>>,
    audio: Arc<Mutex<Vec<Bytes>>>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl SttProbe {
    /// Send `event` on the most recently connected stream
    pub fn emit(&self, event: RecognitionEvent) {
        if let Some(tx) = self.events.lock().last() {
            let _ = tx.send(event);
        }
    }

    pub fn say(&self, text: &str) {
        self.emit(RecognitionEvent::Final(text.to_string()));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn audio(&self) -> Vec<Bytes> {
        self.audio.lock().clone()
    }

    pub fn factory(&self) -> teleagent_gateway::SttFactory {
        let probe = self.clone();
        Arc::new(move || {
            Ok(Box::new(MockSTT {
                config: STTConfig::default(),
                probe: probe.clone(),
                connected: false,
            }) as Box<dyn BaseSTT>)
        })
    }
}

pub struct MockSTT {
    config: STTConfig,
    probe: SttProbe,
    connected: bool,
}

#[async_trait]
impl BaseSTT for MockSTT {
    async fn connect(&mut self, events: RecognitionSender) -> Result<(), STTError> {
        self.probe.events.lock().push(events);
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), STTError> {
        if !self.connected {
            return Err(STTError::NotConnected);
        }
        self.probe.audio.lock().push(audio);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), STTError> {
        if self.connected {
            self.connected = false;
            self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected
    }

    fn get_config(&self) -> &STTConfig {
        &self.config
    }

    fn get_provider_info(&self) -> &'static str {
        "mock"
    }
}

// =============================================================================
// Synthesizer
// =============================================================================

/// What happened to one synthesis request
#[derive(Debug, Clone, PartialEq)]
pub enum TtsEntry {
    /// `overlapping` counts earlier syntheses still streaming, uncancelled,
    /// when this one began
    Started {
        tag: u8,
        text: String,
        kind: SynthesisKind,
        overlapping: usize,
    },
    Cancelled { tag: u8 },
    Completed { tag: u8 },
}

/// Streams `chunks` frames per request, one every `interval`.
///
/// Every byte of a frame equals the request's tag (1 for the first request,
/// 2 for the second, ...), so tests can tell which synthesis a frame that
/// reached the transport belongs to.
pub struct MockTTS {
    config: TTSConfig,
    chunks: usize,
    interval: Duration,
    requests: AtomicUsize,
    fail_kinds: Mutex<Vec<SynthesisKind>>,
    live: Mutex<Vec<(u8, CancellationToken)>>,
    log: Mutex<Vec<TtsEntry>>,
}

impl MockTTS {
    pub fn new(chunks: usize, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            config: TTSConfig::default(),
            chunks,
            interval,
            requests: AtomicUsize::new(0),
            fail_kinds: Mutex::new(Vec::new()),
            live: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Short greeting-friendly default: 5 frames, 10 ms apart
    pub fn quick() -> Arc<Self> {
        Self::new(5, Duration::from_millis(10))
    }

    /// Make every request of `kind` fail before streaming
    pub fn fail_on(&self, kind: SynthesisKind) {
        self.fail_kinds.lock().push(kind);
    }

    pub fn log(&self) -> Vec<TtsEntry> {
        self.log.lock().clone()
    }

    /// Texts of every request, in submission order
    pub fn texts(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                TtsEntry::Started { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Largest number of earlier syntheses that were still live when a new
    /// one started
    pub fn max_overlap(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                TtsEntry::Started { overlapping, .. } => Some(*overlapping),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn finish(&self, tag: u8, entry: TtsEntry) {
        self.live.lock().retain(|(t, _)| *t != tag);
        self.log.lock().push(entry);
    }
}

#[async_trait]
impl BaseTTS for MockTTS {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        sink: &dyn AudioSink,
        cancel: CancellationToken,
    ) -> TTSResult<()> {
        let tag = (self.requests.fetch_add(1, Ordering::SeqCst) + 1) as u8;
        {
            let mut live = self.live.lock();
            let overlapping = live.iter().filter(|(_, c)| !c.is_cancelled()).count();
            live.push((tag, cancel.clone()));
            self.log.lock().push(TtsEntry::Started {
                tag,
                text: request.text.clone(),
                kind: request.kind,
                overlapping,
            });
        }

        if self.fail_kinds.lock().contains(&request.kind) {
            self.live.lock().retain(|(t, _)| *t != tag);
            return Err(TTSError::ProviderError("scripted failure".to_string()));
        }

        for _ in 0..self.chunks {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.finish(tag, TtsEntry::Cancelled { tag });
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
            if let Err(e) = sink.send_audio(Bytes::from(vec![tag; 160])).await {
                if cancel.is_cancelled() {
                    self.finish(tag, TtsEntry::Cancelled { tag });
                    return Ok(());
                }
                self.live.lock().retain(|(t, _)| *t != tag);
                return Err(e);
            }
        }

        self.finish(tag, TtsEntry::Completed { tag });
        Ok(())
    }

    fn get_config(&self) -> &TTSConfig {
        &self.config
    }

    fn get_provider_info(&self) -> &'static str {
        "mock"
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn session_deps(probe: &SttProbe, tts: Arc<MockTTS>) -> SessionDeps {
    session_deps_with(probe, tts, Arc::new(EchoResponder::new()))
}

pub fn session_deps_with(
    probe: &SttProbe,
    tts: Arc<MockTTS>,
    responder: SharedResponder,
) -> SessionDeps {
    SessionDeps {
        stt_factory: probe.factory(),
        tts,
        responder,
        config: Arc::new(SessionConfig::default()),
    }
}

/// Valid configuration that never touches the network
pub fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        public_host: None,
        media_stream_path: "/media-stream".to_string(),
        deepgram_api_key: Some("dg-test".to_string()),
        elevenlabs_api_key: Some("xi-test".to_string()),
        elevenlabs_base_url: None,
        stt_model: "nova-2".to_string(),
        stt_language: "en-US".to_string(),
        tts_voice_id: "voice".to_string(),
        tts_model: "eleven_turbo_v2_5".to_string(),
        greeting_text: teleagent_gateway::core::session::DEFAULT_GREETING.to_string(),
        fallback_text: teleagent_gateway::core::session::DEFAULT_FALLBACK.to_string(),
        utterance_idle_timeout_ms: None,
        max_concurrent_calls: None,
        shutdown_grace_seconds: 1,
    }
}

/// Poll `check` every 5 ms until it holds or `within` elapses
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
