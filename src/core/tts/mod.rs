mod base;
pub mod elevenlabs;

use std::sync::Arc;

pub use base::{
    AudioSink, BaseTTS, SynthesisKind, SynthesisRequest, TTSConfig, TTSError, TTSResult,
};
pub use elevenlabs::{ELEVENLABS_API_URL, ElevenLabsTTS, ElevenLabsTTSConfig, VoiceSettings};

/// Shared handle to a TTS provider; one instance serves every synthesis of a call
pub type SharedTTS = Arc<dyn BaseTTS>;

/// Factory function to create TTS providers by name
pub fn create_tts_provider(provider_type: &str, config: TTSConfig) -> TTSResult<SharedTTS> {
    match provider_type.to_lowercase().as_str() {
        "elevenlabs" | "eleven-labs" => Ok(Arc::new(ElevenLabsTTS::new(config)?)),
        _ => Err(TTSError::InvalidConfiguration(format!(
            "Unsupported TTS provider: {provider_type}. Supported providers: elevenlabs"
        ))),
    }
}
