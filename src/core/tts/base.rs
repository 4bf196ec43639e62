//! # TTS Base Trait
//!
//! Streaming text-to-speech abstraction. A provider receives one immutable
//! [`SynthesisRequest`], pushes audio chunks into an [`AudioSink`] as they
//! arrive from the upstream service, and returns once the stream ends, fails,
//! or the cancellation token fires.
//!
//! Providers hold no per-request state, so one instance is shared by every
//! synthesis of a call (and may be shared across calls).

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// TTS-specific error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TTSError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Audio sink closed")]
    SinkClosed,
}

/// Result type for TTS operations
pub type TTSResult<T> = Result<T, TTSError>;

/// Configuration for TTS providers
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TTSConfig {
    pub provider: String,
    /// API key for the TTS provider
    pub api_key: String,
    /// Voice ID to use for synthesis
    pub voice_id: String,
    /// Model to use for TTS
    pub model: String,
    /// Output audio format ("ulaw" for telephony)
    pub audio_format: String,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Override for the provider's API base URL
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub request_timeout: Option<u64>,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            provider: "elevenlabs".to_string(),
            api_key: String::new(),
            // ElevenLabs "Rachel"
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model: "eleven_turbo_v2_5".to_string(),
            audio_format: "ulaw".to_string(),
            sample_rate: 8000,
            base_url: None,
            request_timeout: Some(30),
        }
    }
}

/// Why a synthesis was requested.
///
/// Drives the failure policy: a failed greeting or response is followed by
/// one apology, a failed apology is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisKind {
    Greeting,
    Response,
    Apology,
}

impl SynthesisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisKind::Greeting => "greeting",
            SynthesisKind::Response => "response",
            SynthesisKind::Apology => "apology",
        }
    }
}

impl std::fmt::Display for SynthesisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable unit of text to speak
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub audio_format: String,
    pub sample_rate: u32,
    pub model: String,
    pub kind: SynthesisKind,
}

impl SynthesisRequest {
    /// Build a request using the voice settings of `config`
    pub fn new(text: impl Into<String>, kind: SynthesisKind, config: &TTSConfig) -> Self {
        Self {
            text: text.into(),
            voice_id: config.voice_id.clone(),
            audio_format: config.audio_format.clone(),
            sample_rate: config.sample_rate,
            model: config.model.clone(),
            kind,
        }
    }
}

/// Destination for synthesized audio chunks
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver one chunk. An error means nobody is listening any more and the
    /// provider should stop streaming.
    async fn send_audio(&self, chunk: Bytes) -> TTSResult<()>;
}

#[async_trait]
impl AudioSink for mpsc::Sender<Bytes> {
    async fn send_audio(&self, chunk: Bytes) -> TTSResult<()> {
        self.send(chunk).await.map_err(|_| TTSError::SinkClosed)
    }
}

/// Base trait for streaming Text-to-Speech providers
#[async_trait]
pub trait BaseTTS: Send + Sync {
    /// Stream the audio for `request` into `sink`.
    ///
    /// Returns `Ok(())` when the upstream stream ends or when `cancel` fires;
    /// in the latter case the in-flight HTTP request is dropped.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        sink: &dyn AudioSink,
        cancel: CancellationToken,
    ) -> TTSResult<()>;

    fn get_config(&self) -> &TTSConfig;

    /// Static provider name used in logs
    fn get_provider_info(&self) -> &'static str;
}
