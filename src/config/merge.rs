use std::env;
use std::path::PathBuf;

use super::utils::{parse_bool, parse_number};
use super::yaml::YamlConfig;
use super::{
    DEFAULT_MEDIA_STREAM_PATH, DEFAULT_PORT, DEFAULT_SHUTDOWN_GRACE_SECONDS, ServerConfig,
    TlsConfig,
};
use crate::core::session::{DEFAULT_FALLBACK, DEFAULT_GREETING};
use crate::core::stt::STTConfig;
use crate::core::tts::TTSConfig;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// Merging does not validate; callers run [`ServerConfig::validate`].
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    // Helper macro for parsed values: YAML > ENV (parsed) > None
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr) => {
            match $yaml_value {
                Some(value) => Some(value),
                None => match env::var($env_var) {
                    Ok(raw) => Some(parse_number($env_var, &raw)?),
                    Err(_) => None,
                },
            }
        };
    }

    let server = yaml.server.as_ref();
    let providers = yaml.providers.as_ref();
    let stt = yaml.stt.as_ref();
    let tts = yaml.tts.as_ref();
    let agent = yaml.agent.as_ref();

    // Server configuration
    let host = get_value!("HOST", server.and_then(|s| s.host.clone()), "0.0.0.0");
    let port: u16 = get_parsed!("PORT", server.and_then(|s| s.port)).unwrap_or(DEFAULT_PORT);
    let public_host = get_optional!("PUBLIC_HOST", server.and_then(|s| s.public_host.clone()));
    let media_stream_path = get_value!(
        "MEDIA_STREAM_PATH",
        server.and_then(|s| s.media_stream_path.clone()),
        DEFAULT_MEDIA_STREAM_PATH
    );
    let max_concurrent_calls: Option<usize> = get_parsed!(
        "MAX_CONCURRENT_CALLS",
        server.and_then(|s| s.max_concurrent_calls)
    );
    let shutdown_grace_seconds: u64 = get_parsed!(
        "SHUTDOWN_GRACE_SECONDS",
        server.and_then(|s| s.shutdown_grace_seconds)
    )
    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECONDS);

    let tls = merge_tls(&yaml)?;

    // Provider API keys
    let deepgram_api_key = get_optional!(
        "DEEPGRAM_API_KEY",
        providers.and_then(|p| p.deepgram_api_key.clone())
    );
    let elevenlabs_api_key = get_optional!(
        "ELEVENLABS_API_KEY",
        providers.and_then(|p| p.elevenlabs_api_key.clone())
    );
    let elevenlabs_base_url = get_optional!(
        "ELEVENLABS_BASE_URL",
        providers.and_then(|p| p.elevenlabs_base_url.clone())
    );

    // Voice settings
    let stt_defaults = STTConfig::default();
    let tts_defaults = TTSConfig::default();
    let stt_model = get_value!("STT_MODEL", stt.and_then(|s| s.model.clone()), stt_defaults.model);
    let stt_language = get_value!(
        "STT_LANGUAGE",
        stt.and_then(|s| s.language.clone()),
        stt_defaults.language
    );
    let tts_voice_id = get_value!(
        "TTS_VOICE_ID",
        tts.and_then(|t| t.voice_id.clone()),
        tts_defaults.voice_id
    );
    let tts_model = get_value!("TTS_MODEL", tts.and_then(|t| t.model.clone()), tts_defaults.model);

    // Conversation settings
    let greeting_text = get_value!(
        "GREETING_TEXT",
        agent.and_then(|a| a.greeting_text.clone()),
        DEFAULT_GREETING
    );
    let fallback_text = get_value!(
        "FALLBACK_TEXT",
        agent.and_then(|a| a.fallback_text.clone()),
        DEFAULT_FALLBACK
    );
    let utterance_idle_timeout_ms: Option<u64> = get_parsed!(
        "UTTERANCE_IDLE_TIMEOUT_MS",
        agent.and_then(|a| a.utterance_idle_timeout_ms)
    );

    Ok(ServerConfig {
        host,
        port,
        tls,
        public_host,
        media_stream_path,
        deepgram_api_key,
        elevenlabs_api_key,
        elevenlabs_base_url,
        stt_model,
        stt_language,
        tts_voice_id,
        tts_model,
        greeting_text,
        fallback_text,
        utterance_idle_timeout_ms,
        max_concurrent_calls,
        shutdown_grace_seconds,
    })
}

/// TLS is on when enabled explicitly, or when both paths are given
fn merge_tls(yaml: &YamlConfig) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    let tls_yaml = yaml.server.as_ref().and_then(|s| s.tls.as_ref());

    let enabled = match tls_yaml.and_then(|t| t.enabled) {
        Some(enabled) => Some(enabled),
        None => match env::var("TLS_ENABLED") {
            Ok(raw) => Some(
                parse_bool(&raw).ok_or_else(|| format!("Invalid TLS_ENABLED value '{raw}'"))?,
            ),
            Err(_) => None,
        },
    };
    let cert_path = tls_yaml
        .and_then(|t| t.cert_path.clone())
        .or_else(|| env::var("TLS_CERT_PATH").ok());
    let key_path = tls_yaml
        .and_then(|t| t.key_path.clone())
        .or_else(|| env::var("TLS_KEY_PATH").ok());

    let wanted = enabled.unwrap_or(cert_path.is_some() && key_path.is_some());
    if !wanted {
        return Ok(None);
    }

    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        _ => Err("TLS is enabled but TLS_CERT_PATH and TLS_KEY_PATH are not both set".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AgentYaml, ProvidersYaml, ServerYaml};
    use serial_test::serial;

    const VARS: &[&str] = &[
        "HOST",
        "PORT",
        "PUBLIC_HOST",
        "MEDIA_STREAM_PATH",
        "MAX_CONCURRENT_CALLS",
        "SHUTDOWN_GRACE_SECONDS",
        "DEEPGRAM_API_KEY",
        "ELEVENLABS_API_KEY",
        "ELEVENLABS_BASE_URL",
        "STT_MODEL",
        "STT_LANGUAGE",
        "TTS_VOICE_ID",
        "TTS_MODEL",
        "GREETING_TEXT",
        "FALLBACK_TEXT",
        "UTTERANCE_IDLE_TIMEOUT_MS",
        "TLS_ENABLED",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
    ];

    fn cleanup_env_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_yaml_or_env() {
        cleanup_env_vars();
        let config = merge_config(None).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.media_stream_path, "/media-stream");
        assert_eq!(config.stt_model, "nova-2");
        assert_eq!(config.stt_language, "en-US");
        assert_eq!(config.tts_voice_id, "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(config.greeting_text, DEFAULT_GREETING);
        assert_eq!(config.shutdown_grace_seconds, 10);
        assert!(config.max_concurrent_calls.is_none());
        assert!(config.utterance_idle_timeout_ms.is_none());
        assert!(config.tls.is_none());
        assert!(config.deepgram_api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_env_values_are_used() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "9000");
            env::set_var("DEEPGRAM_API_KEY", "env-dg");
            env::set_var("MAX_CONCURRENT_CALLS", "12");
            env::set_var("UTTERANCE_IDLE_TIMEOUT_MS", "900");
            env::set_var("GREETING_TEXT", "Welcome");
        }

        let config = merge_config(None).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.deepgram_api_key.as_deref(), Some("env-dg"));
        assert_eq!(config.max_concurrent_calls, Some(12));
        assert_eq!(config.utterance_idle_timeout_ms, Some(900));
        assert_eq!(config.greeting_text, "Welcome");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_yaml_overrides_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "9000");
            env::set_var("DEEPGRAM_API_KEY", "env-dg");
            env::set_var("GREETING_TEXT", "Env greeting");
        }

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                port: Some(7000),
                ..Default::default()
            }),
            providers: Some(ProvidersYaml {
                deepgram_api_key: Some("yaml-dg".to_string()),
                ..Default::default()
            }),
            agent: Some(AgentYaml {
                greeting_text: Some("Yaml greeting".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.deepgram_api_key.as_deref(), Some("yaml-dg"));
        assert_eq!(config.greeting_text, "Yaml greeting");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_are_rejected() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }
        let err = merge_config(None).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT value"));

        cleanup_env_vars();
        unsafe {
            env::set_var("MAX_CONCURRENT_CALLS", "-3");
        }
        assert!(merge_config(None).is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_tls_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TLS_CERT_PATH", "/certs/cert.pem");
            env::set_var("TLS_KEY_PATH", "/certs/key.pem");
        }
        let config = merge_config(None).unwrap();
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("/certs/cert.pem"));

        unsafe {
            env::set_var("TLS_ENABLED", "false");
        }
        assert!(merge_config(None).unwrap().tls.is_none());

        cleanup_env_vars();
        unsafe {
            env::set_var("TLS_ENABLED", "true");
            env::set_var("TLS_CERT_PATH", "/certs/cert.pem");
        }
        assert!(merge_config(None).is_err());

        cleanup_env_vars();
    }
}
