use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Recognition event produced by a streaming STT engine.
///
/// Events are delivered in the order the engine emits them. `Error` carries
/// engine failures inline so a session can route them without a side channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Provisional transcript; may be revised by later events
    Interim(String),
    /// Transcript segment that will not be revised
    Final(String),
    /// Voice activity detected on the inbound stream
    SpeechStarted,
    /// End of an utterance as judged by the engine
    SpeechEnded,
    /// Engine failure; see [`STTError::is_fatal`]
    Error(STTError),
}

impl RecognitionEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, RecognitionEvent::Final(_))
    }
}

/// Sender half used by providers to publish recognition events
pub type RecognitionSender = mpsc::UnboundedSender<RecognitionEvent>;

/// Receiver half consumed by the session loop
pub type RecognitionReceiver = mpsc::UnboundedReceiver<RecognitionEvent>;

/// Configuration for STT providers
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct STTConfig {
    pub provider: String,
    /// API key for the STT provider
    pub api_key: String,
    /// Model to use for transcription
    pub model: String,
    /// Language code for transcription (e.g., "en-US", "es-ES")
    pub language: String,
    /// Encoding of the inbound audio ("mulaw" for telephony)
    pub encoding: String,
    /// Sample rate of the audio in Hz
    pub sample_rate: u32,
    /// Number of audio channels (1 for mono, 2 for stereo)
    pub channels: u16,
    /// Enable punctuation in results
    pub punctuation: bool,
}

impl Default for STTConfig {
    fn default() -> Self {
        Self {
            provider: "deepgram".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            encoding: "mulaw".to_string(),
            sample_rate: 8000,
            channels: 1,
            punctuation: true,
        }
    }
}

/// Error types for STT operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum STTError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Recognition stream closed: {0}")]
    StreamClosed(String),
}

impl STTError {
    /// Whether the recognition stream is unusable after this error.
    ///
    /// Fatal errors end the call; everything else is logged and the session
    /// keeps listening.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            STTError::ConnectionFailed(_)
                | STTError::AuthenticationFailed(_)
                | STTError::NetworkError(_)
                | STTError::StreamClosed(_)
        )
    }
}

/// Base trait for streaming Speech-to-Text providers
#[async_trait]
pub trait BaseSTT: Send + Sync {
    /// Open the recognition stream.
    ///
    /// Every event the engine produces for this stream is pushed to `events`
    /// until [`BaseSTT::disconnect`] is called or the stream fails.
    async fn connect(&mut self, events: RecognitionSender) -> Result<(), STTError>;

    /// Forward one chunk of inbound audio, unchanged, to the engine
    async fn send_audio(&mut self, audio: Bytes) -> Result<(), STTError>;

    /// Close the recognition stream. Calling it twice is harmless.
    async fn disconnect(&mut self) -> Result<(), STTError>;

    /// Check if the provider is ready to accept audio
    fn is_ready(&self) -> bool;

    fn get_config(&self) -> &STTConfig;

    /// Static provider name used in logs
    fn get_provider_info(&self) -> &'static str;
}
