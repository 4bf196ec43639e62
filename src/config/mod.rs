//! Configuration module for the telephony gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use teleagent_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use utils::parse_bool;
pub use yaml::YamlConfig;

use crate::core::session::{SessionConfig, UtterancePolicy};
use crate::core::stt::STTConfig;
use crate::core::tts::TTSConfig;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MEDIA_STREAM_PATH: &str = "/media-stream";
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 10;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS, public host name for TwiML)
/// - Provider API keys (Deepgram, ElevenLabs)
/// - Voice settings (recognition model and language, synthesis voice and model)
/// - Conversation settings (greeting, fallback apology, utterance coalescing)
/// - Capacity and shutdown limits
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Host name Twilio should dial back for the media stream. When unset the
    /// request's `Host` header is used.
    pub public_host: Option<String>,
    /// Path of the media stream WebSocket endpoint
    pub media_stream_path: String,

    // Provider API keys
    pub deepgram_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    /// Override for the ElevenLabs API base URL
    pub elevenlabs_base_url: Option<String>,

    // Voice settings
    pub stt_model: String,
    pub stt_language: String,
    pub tts_voice_id: String,
    pub tts_model: String,

    // Conversation settings
    pub greeting_text: String,
    pub fallback_text: String,
    /// When set, consecutive final transcripts are joined until this much
    /// silence has passed
    pub utterance_idle_timeout_ms: Option<u64>,

    // Limits
    /// Maximum concurrent calls. Default: None (unlimited)
    pub max_concurrent_calls: Option<usize>,
    pub shutdown_grace_seconds: u64,
}

/// Zeroize provider keys when the configuration is dropped
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.deepgram_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.elevenlabs_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs, so it already sits under the real
        // environment here.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Run every validation rule against this configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_provider_keys(&self.deepgram_api_key, &self.elevenlabs_api_key)?;
        validation::validate_media_stream_path(&self.media_stream_path)?;
        validation::validate_public_host(&self.public_host)?;
        validation::validate_tls(&self.tls)?;
        validation::validate_limits(self.max_concurrent_calls, self.utterance_idle_timeout_ms)?;
        validation::validate_conversation_text(&self.greeting_text, &self.fallback_text)?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Get API key for a specific provider
    pub fn get_api_key(&self, provider: &str) -> Result<String, String> {
        match provider.to_lowercase().as_str() {
            "deepgram" => self.deepgram_api_key.as_ref().cloned().ok_or_else(|| {
                "Deepgram API key not configured in server environment".to_string()
            }),
            "elevenlabs" | "eleven-labs" => {
                self.elevenlabs_api_key.as_ref().cloned().ok_or_else(|| {
                    "ElevenLabs API key not configured in server environment".to_string()
                })
            }
            _ => Err(format!("Unsupported provider: {provider}")),
        }
    }

    /// Recognition settings for one call: 8 kHz mono mu-law from Twilio
    pub fn stt_config(&self) -> Result<STTConfig, String> {
        Ok(STTConfig {
            provider: "deepgram".to_string(),
            api_key: self.get_api_key("deepgram")?,
            model: self.stt_model.clone(),
            language: self.stt_language.clone(),
            ..STTConfig::default()
        })
    }

    /// Synthesis settings, producing audio Twilio can play without transcoding
    pub fn tts_config(&self) -> Result<TTSConfig, String> {
        Ok(TTSConfig {
            provider: "elevenlabs".to_string(),
            api_key: self.get_api_key("elevenlabs")?,
            voice_id: self.tts_voice_id.clone(),
            model: self.tts_model.clone(),
            base_url: self.elevenlabs_base_url.clone(),
            ..TTSConfig::default()
        })
    }

    pub fn utterance_policy(&self) -> UtterancePolicy {
        match self.utterance_idle_timeout_ms {
            Some(ms) => UtterancePolicy::Coalesce {
                idle: Duration::from_millis(ms),
            },
            None => UtterancePolicy::PerFinal,
        }
    }

    /// Per-call behaviour derived from this configuration
    pub fn session_config(&self) -> Result<Arc<SessionConfig>, String> {
        Ok(Arc::new(SessionConfig {
            greeting_text: self.greeting_text.clone(),
            fallback_text: self.fallback_text.clone(),
            tts: self.tts_config()?,
            utterance_policy: self.utterance_policy(),
            ..SessionConfig::default()
        }))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::{DEFAULT_FALLBACK, DEFAULT_GREETING};

    pub(crate) fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tls: None,
            public_host: None,
            media_stream_path: DEFAULT_MEDIA_STREAM_PATH.to_string(),
            deepgram_api_key: Some("dg-key".to_string()),
            elevenlabs_api_key: Some("xi-key".to_string()),
            elevenlabs_base_url: None,
            stt_model: "nova-2".to_string(),
            stt_language: "en-US".to_string(),
            tts_voice_id: "voice".to_string(),
            tts_model: "eleven_turbo_v2_5".to_string(),
            greeting_text: DEFAULT_GREETING.to_string(),
            fallback_text: DEFAULT_FALLBACK.to_string(),
            utterance_idle_timeout_ms: None,
            max_concurrent_calls: None,
            shutdown_grace_seconds: 10,
        }
    }

    #[test]
    fn test_address() {
        assert_eq!(test_config().address(), "127.0.0.1:8080");
        assert!(!test_config().is_tls_enabled());
    }

    #[test]
    fn test_get_api_key() {
        let config = test_config();
        assert_eq!(config.get_api_key("Deepgram").unwrap(), "dg-key");
        assert_eq!(config.get_api_key("elevenlabs").unwrap(), "xi-key");
        assert!(config.get_api_key("azure").is_err());

        let mut missing = test_config();
        missing.deepgram_api_key = None;
        assert!(
            missing
                .get_api_key("deepgram")
                .unwrap_err()
                .contains("not configured")
        );
    }

    #[test]
    fn test_stt_config_is_telephony_audio() {
        let stt = test_config().stt_config().unwrap();
        assert_eq!(stt.api_key, "dg-key");
        assert_eq!(stt.encoding, "mulaw");
        assert_eq!(stt.sample_rate, 8000);
        assert_eq!(stt.channels, 1);
    }

    #[test]
    fn test_tts_config_carries_voice_and_base_url() {
        let mut config = test_config();
        config.elevenlabs_base_url = Some("http://127.0.0.1:9999".to_string());
        let tts = config.tts_config().unwrap();
        assert_eq!(tts.voice_id, "voice");
        assert_eq!(tts.audio_format, "ulaw");
        assert_eq!(tts.base_url.as_deref(), Some("http://127.0.0.1:9999"));
    }

    #[test]
    fn test_utterance_policy() {
        let mut config = test_config();
        assert_eq!(config.utterance_policy(), UtterancePolicy::PerFinal);
        config.utterance_idle_timeout_ms = Some(700);
        assert_eq!(
            config.utterance_policy(),
            UtterancePolicy::Coalesce {
                idle: Duration::from_millis(700)
            }
        );
    }

    #[test]
    fn test_session_config() {
        let session = test_config().session_config().unwrap();
        assert_eq!(session.greeting_text, DEFAULT_GREETING);
        assert_eq!(session.tts.voice_id, "voice");
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(test_config().validate().is_ok());
    }
}
