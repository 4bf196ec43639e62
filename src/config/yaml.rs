use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values given here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///   public_host: "agent.example.com"
///   media_stream_path: "/media-stream"
///   max_concurrent_calls: 50
///   shutdown_grace_seconds: 10
///   tls:
///     enabled: true
///     cert_path: "/etc/gateway/cert.pem"
///     key_path: "/etc/gateway/key.pem"
///
/// providers:
///   deepgram_api_key: "your-deepgram-key"
///   elevenlabs_api_key: "your-elevenlabs-key"
///   elevenlabs_base_url: "https://api.elevenlabs.io"
///
/// stt:
///   model: "nova-2"
///   language: "en-US"
///
/// tts:
///   voice_id: "21m00Tcm4TlvDq8ikWAM"
///   model: "eleven_turbo_v2_5"
///
/// agent:
///   greeting_text: "Hello! How can I help you today?"
///   fallback_text: "Sorry, could you say that again?"
///   utterance_idle_timeout_ms: 800
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub stt: Option<SttYaml>,
    pub tts: Option<TtsYaml>,
    pub agent: Option<AgentYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
    pub media_stream_path: Option<String>,
    pub max_concurrent_calls: Option<usize>,
    pub shutdown_grace_seconds: Option<u64>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub deepgram_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: Option<String>,
}

/// Recognition settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SttYaml {
    pub model: Option<String>,
    pub language: Option<String>,
}

/// Synthesis settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub voice_id: Option<String>,
    pub model: Option<String>,
}

/// Conversation settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentYaml {
    pub greeting_text: Option<String>,
    pub fallback_text: Option<String>,
    pub utterance_idle_timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
