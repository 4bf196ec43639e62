//! Configuration types for the ElevenLabs streaming TTS API.

use serde::{Deserialize, Serialize};

use crate::core::tts::base::{SynthesisRequest, TTSConfig, TTSError};

/// Default ElevenLabs API base URL
pub const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io";

/// Voice settings for ElevenLabs TTS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Voice stability (0.0 to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f32>,
    /// Similarity boost (0.0 to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f32>,
    /// Style strength (0.0 to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<f32>,
    /// Use speaker boost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: Some(0.5),
            similarity_boost: Some(0.75),
            style: None,
            use_speaker_boost: None,
        }
    }
}

/// Body of `POST /v1/text-to-speech/{voice_id}/stream`
#[derive(Debug, Clone, Serialize)]
pub struct StreamRequestBody<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
    pub voice_settings: &'a VoiceSettings,
}

/// Configuration specific to ElevenLabs TTS
#[derive(Debug, Clone)]
pub struct ElevenLabsTTSConfig {
    /// Base TTS configuration
    pub base: TTSConfig,
    pub voice_settings: VoiceSettings,
}

impl ElevenLabsTTSConfig {
    pub fn from_base(base: TTSConfig) -> Self {
        Self {
            base,
            voice_settings: VoiceSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), TTSError> {
        if self.base.api_key.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "API key is required for ElevenLabs".to_string(),
            ));
        }
        output_format(&self.base.audio_format, self.base.sample_rate)?;
        Ok(())
    }

    pub fn api_base(&self) -> &str {
        self.base
            .base_url
            .as_deref()
            .unwrap_or(ELEVENLABS_API_URL)
            .trim_end_matches('/')
    }

    /// Streaming endpoint for one request, including the `output_format` query
    pub fn stream_url(&self, request: &SynthesisRequest) -> Result<String, TTSError> {
        if request.voice_id.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "voice_id is required for ElevenLabs".to_string(),
            ));
        }
        let format = output_format(&request.audio_format, request.sample_rate)?;
        Ok(format!(
            "{}/v1/text-to-speech/{}/stream?output_format={format}",
            self.api_base(),
            request.voice_id
        ))
    }
}

/// Map a format name and sample rate onto an ElevenLabs `output_format` value
pub fn output_format(audio_format: &str, sample_rate: u32) -> Result<String, TTSError> {
    match audio_format.to_lowercase().as_str() {
        "ulaw" | "mulaw" | "ulaw_8000" => {
            if sample_rate != 8000 {
                return Err(TTSError::InvalidConfiguration(format!(
                    "mu-law output is only available at 8000 Hz, got {sample_rate}"
                )));
            }
            Ok("ulaw_8000".to_string())
        }
        "pcm" | "linear16" => match sample_rate {
            16000 | 22050 | 24000 | 44100 => Ok(format!("pcm_{sample_rate}")),
            other => Err(TTSError::InvalidConfiguration(format!(
                "Unsupported PCM sample rate: {other}"
            ))),
        },
        "mp3" => Ok("mp3_44100_128".to_string()),
        other => Err(TTSError::InvalidConfiguration(format!(
            "Unsupported audio format: {other}"
        ))),
    }
}

/// `Accept` header matching an `output_format` value
pub fn accept_header(output_format: &str) -> &'static str {
    if output_format.starts_with("ulaw") {
        "audio/basic"
    } else if output_format.starts_with("mp3") {
        "audio/mpeg"
    } else {
        "audio/pcm"
    }
}
