//! ElevenLabs streaming TTS provider.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::{ElevenLabsTTSConfig, StreamRequestBody, accept_header, output_format};
use crate::core::tts::base::{
    AudioSink, BaseTTS, SynthesisRequest, TTSConfig, TTSError, TTSResult,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// ElevenLabs TTS provider using the HTTP streaming endpoint.
///
/// Each call to [`BaseTTS::synthesize`] issues one chunked request and
/// forwards the body to the sink chunk by chunk. Dropping the response body
/// on cancellation aborts the transfer.
pub struct ElevenLabsTTS {
    config: ElevenLabsTTSConfig,
    client: reqwest::Client,
}

impl ElevenLabsTTS {
    pub fn new(config: TTSConfig) -> TTSResult<Self> {
        Self::with_config(ElevenLabsTTSConfig::from_base(config))
    }

    pub fn with_config(config: ElevenLabsTTSConfig) -> TTSResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TTSError::InvalidConfiguration(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.config.base.request_timeout.unwrap_or(30))
    }
}

#[async_trait]
impl BaseTTS for ElevenLabsTTS {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        sink: &dyn AudioSink,
        cancel: CancellationToken,
    ) -> TTSResult<()> {
        let url = self.config.stream_url(request)?;
        let format = output_format(&request.audio_format, request.sample_rate)?;
        let model_id = if request.model.is_empty() {
            self.config.base.model.as_str()
        } else {
            request.model.as_str()
        };
        let body = StreamRequestBody {
            text: &request.text,
            model_id,
            voice_settings: &self.config.voice_settings,
        };

        let send = self
            .client
            .post(url)
            .header("xi-api-key", &self.config.base.api_key)
            .header("Accept", accept_header(&format))
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("ElevenLabs request cancelled before response");
                return Ok(());
            }
            result = timeout(self.response_timeout(), send) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    return Err(TTSError::NetworkError(format!("ElevenLabs request failed: {e}")));
                }
                Err(_) => {
                    return Err(TTSError::TimeoutError(
                        "ElevenLabs did not respond in time".to_string(),
                    ));
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "ElevenLabs rejected synthesis request");
            return Err(match status.as_u16() {
                401 | 403 => TTSError::InvalidConfiguration(format!(
                    "ElevenLabs rejected the API key: {detail}"
                )),
                _ => TTSError::ProviderError(format!("ElevenLabs returned {status}: {detail}")),
            });
        }

        let mut stream = response.bytes_stream();
        let mut total = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(bytes = total, "ElevenLabs stream cancelled");
                    return Ok(());
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        if bytes.is_empty() {
                            continue;
                        }
                        total += bytes.len();
                        sink.send_audio(bytes).await?;
                    }
                    Some(Err(e)) => {
                        return Err(TTSError::NetworkError(format!(
                            "ElevenLabs stream interrupted: {e}"
                        )));
                    }
                    None => {
                        debug!(bytes = total, "ElevenLabs stream complete");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn get_config(&self) -> &TTSConfig {
        &self.config.base
    }

    fn get_provider_info(&self) -> &'static str {
        "elevenlabs"
    }
}
