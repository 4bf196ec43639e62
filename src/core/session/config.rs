use std::time::Duration;

use crate::core::tts::TTSConfig;

use super::transcript::UtterancePolicy;

pub const DEFAULT_GREETING: &str = "Hello! I'm your voice assistant powered by Deepgram and ElevenLabs. How can I help you today?";

pub const DEFAULT_FALLBACK: &str =
    "I'm sorry, I had trouble with that. Could you please say it again?";

/// Per-call behaviour shared by every session of a gateway
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Spoken as soon as the call connects
    pub greeting_text: String,
    /// Spoken once when generating or synthesizing a reply fails
    pub fallback_text: String,
    /// Voice settings applied to every synthesis request
    pub tts: TTSConfig,
    pub utterance_policy: UtterancePolicy,
    /// Upper bound for opening the recognition stream
    pub stt_connect_timeout: Duration,
    /// Upper bound for a graceful recognition shutdown
    pub stt_stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting_text: DEFAULT_GREETING.to_string(),
            fallback_text: DEFAULT_FALLBACK.to_string(),
            tts: TTSConfig::default(),
            utterance_policy: UtterancePolicy::PerFinal,
            stt_connect_timeout: Duration::from_secs(10),
            stt_stop_timeout: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    pub fn with_utterance_policy(mut self, policy: UtterancePolicy) -> Self {
        self.utterance_policy = policy;
        self
    }
}
