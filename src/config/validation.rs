use super::TlsConfig;

/// Both providers are required to hold a conversation
pub fn validate_provider_keys(
    deepgram_api_key: &Option<String>,
    elevenlabs_api_key: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if deepgram_api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
        return Err("DEEPGRAM_API_KEY is required".into());
    }
    if elevenlabs_api_key
        .as_deref()
        .is_none_or(|k| k.trim().is_empty())
    {
        return Err("ELEVENLABS_API_KEY is required".into());
    }
    Ok(())
}

/// The media stream path is embedded in TwiML and routed by axum
pub fn validate_media_stream_path(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(format!("MEDIA_STREAM_PATH must start with '/' and name a route: '{path}'").into());
    }
    if path.contains(char::is_whitespace) || path.contains(['?', '#', '{', '}']) {
        return Err(format!("MEDIA_STREAM_PATH contains invalid characters: '{path}'").into());
    }
    Ok(())
}

/// PUBLIC_HOST is a bare host (with optional port), never a URL
pub fn validate_public_host(public_host: &Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(host) = public_host else {
        return Ok(());
    };
    if host.trim().is_empty() {
        return Err("PUBLIC_HOST cannot be empty".into());
    }
    if host.contains("://") || host.contains('/') {
        return Err(format!("PUBLIC_HOST must be a host name without scheme or path: '{host}'").into());
    }
    Ok(())
}

/// Certificate and key files must exist when TLS is on
pub fn validate_tls(tls: &Option<TlsConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(tls) = tls else {
        return Ok(());
    };
    if !tls.cert_path.exists() {
        return Err(format!(
            "TLS certificate file does not exist: {}",
            tls.cert_path.display()
        )
        .into());
    }
    if !tls.key_path.exists() {
        return Err(format!("TLS key file does not exist: {}", tls.key_path.display()).into());
    }
    Ok(())
}

pub fn validate_limits(
    max_concurrent_calls: Option<usize>,
    utterance_idle_timeout_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_concurrent_calls == Some(0) {
        return Err("MAX_CONCURRENT_CALLS must be greater than 0".into());
    }
    if utterance_idle_timeout_ms == Some(0) {
        return Err("UTTERANCE_IDLE_TIMEOUT_MS must be greater than 0".into());
    }
    Ok(())
}

pub fn validate_conversation_text(
    greeting_text: &str,
    fallback_text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if greeting_text.trim().is_empty() {
        return Err("GREETING_TEXT cannot be empty".into());
    }
    if fallback_text.trim().is_empty() {
        return Err("FALLBACK_TEXT cannot be empty".into());
    }
    Ok(())
}
