//! Configuration for the Deepgram live transcription socket.

use std::time::Duration;

use url::Url;

use crate::core::stt::base::{STTConfig, STTError};

/// Default Deepgram live transcription endpoint
pub const DEEPGRAM_STT_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Deepgram rejects `utterance_end_ms` below this value
const MIN_UTTERANCE_END_MS: u32 = 1000;

/// Configuration specific to Deepgram STT
#[derive(Debug, Clone)]
pub struct DeepgramSTTConfig {
    /// Base STT configuration
    pub base: STTConfig,
    /// WebSocket endpoint, overridable for self-hosted deployments and tests
    pub endpoint: String,
    /// Enable interim results
    pub interim_results: bool,
    /// Voice activity detection events (`SpeechStarted`)
    pub vad_events: bool,
    /// Silence gap that produces an `UtteranceEnd` message
    pub utterance_end_ms: Option<u32>,
    /// Enable smart formatting
    pub smart_format: bool,
    /// Endpointing silence in milliseconds
    pub endpointing: Option<u32>,
    /// Interval between `KeepAlive` frames while no audio flows
    pub keepalive_interval: Duration,
    /// Upper bound on the WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for DeepgramSTTConfig {
    fn default() -> Self {
        Self::from_base(STTConfig::default())
    }
}

impl DeepgramSTTConfig {
    pub fn from_base(base: STTConfig) -> Self {
        Self {
            base,
            endpoint: DEEPGRAM_STT_URL.to_string(),
            interim_results: true,
            vad_events: true,
            utterance_end_ms: Some(MIN_UTTERANCE_END_MS),
            smart_format: true,
            endpointing: Some(300),
            keepalive_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> Result<(), STTError> {
        if self.base.api_key.is_empty() {
            return Err(STTError::ConfigurationError(
                "API key is required for Deepgram".to_string(),
            ));
        }
        if self.base.sample_rate == 0 {
            return Err(STTError::ConfigurationError(
                "Sample rate must be greater than zero".to_string(),
            ));
        }
        if let Some(ms) = self.utterance_end_ms {
            if ms < MIN_UTTERANCE_END_MS {
                return Err(STTError::ConfigurationError(format!(
                    "utterance_end_ms must be at least {MIN_UTTERANCE_END_MS}, got {ms}"
                )));
            }
            if !self.interim_results {
                return Err(STTError::ConfigurationError(
                    "utterance_end_ms requires interim_results".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Build the WebSocket URL with query parameters
    pub fn build_websocket_url(&self) -> Result<String, STTError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| STTError::ConfigurationError(format!("Invalid WebSocket URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("model", &self.base.model);
            query.append_pair("language", &self.base.language);
            query.append_pair("encoding", &self.base.encoding);
            query.append_pair("sample_rate", &self.base.sample_rate.to_string());
            query.append_pair("channels", &self.base.channels.to_string());
            query.append_pair("interim_results", &self.interim_results.to_string());
            query.append_pair("vad_events", &self.vad_events.to_string());
            query.append_pair("punctuate", &self.base.punctuation.to_string());
            query.append_pair("smart_format", &self.smart_format.to_string());

            if let Some(ms) = self.utterance_end_ms {
                query.append_pair("utterance_end_ms", &ms.to_string());
            }
            if let Some(endpointing) = self.endpointing {
                query.append_pair("endpointing", &endpointing.to_string());
            }
        }

        Ok(url.to_string())
    }
}
