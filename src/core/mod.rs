pub mod registry;
pub mod responder;
pub mod session;
pub mod stt;
pub mod transport;
pub mod tts;

// Re-export commonly used types for convenience
pub use stt::{
    BaseSTT, DeepgramSTT, DeepgramSTTConfig, RecognitionEvent, STTConfig, STTError, STTProvider,
    create_stt_provider, create_stt_provider_from_enum, get_supported_stt_providers,
};

pub use tts::{
    AudioSink, BaseTTS, ElevenLabsTTS, SharedTTS, SynthesisKind, SynthesisRequest, TTSConfig,
    TTSError, TTSResult, create_tts_provider,
};

pub use transport::{
    CallConnection, CallMetadata, ConnectionPeer, ConnectionStream, OutboundAudio,
    TransportError, TransportEvent, TwilioTransport,
};

pub use responder::{EchoResponder, ResponderError, ResponseGenerator, SharedResponder};

pub use session::{
    CloseReason, Session, SessionConfig, SessionDeps, SessionError, SessionEvent, SessionHandle,
    SessionState, SttFactory, UtterancePolicy,
};

pub use registry::{RegistryError, SessionRegistry};
