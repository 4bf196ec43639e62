//! Deepgram STT WebSocket client implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use super::config::DeepgramSTTConfig;
use super::messages::{ControlMessage, DeepgramMessage};
use crate::core::stt::base::{BaseSTT, RecognitionEvent, RecognitionSender, STTConfig, STTError};

/// Bounded audio queue between `send_audio` and the socket task
const AUDIO_QUEUE_SIZE: usize = 64;

/// How long `disconnect` waits for the socket task to finish
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Deepgram STT WebSocket client.
///
/// ```text
/// send_audio() ──► audio queue ──► socket task ──► Deepgram
///                                      │
///                 RecognitionSender ◄──┘
/// ```
///
/// The socket task owns both halves of the WebSocket. It exits on
/// `disconnect`, when the audio queue is dropped, or when the socket fails;
/// in the last case it publishes a fatal [`RecognitionEvent::Error`].
pub struct DeepgramSTT {
    config: DeepgramSTTConfig,
    audio_tx: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<JoinHandle<()>>,
    is_connected: Arc<AtomicBool>,
}

impl DeepgramSTT {
    pub fn new(config: STTConfig) -> Result<Self, STTError> {
        Self::with_config(DeepgramSTTConfig::from_base(config))
    }

    pub fn with_config(config: DeepgramSTTConfig) -> Result<Self, STTError> {
        config.validate()?;
        Ok(Self {
            config,
            audio_tx: None,
            shutdown_tx: None,
            connection_handle: None,
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn deepgram_config(&self) -> &DeepgramSTTConfig {
        &self.config
    }

    /// Handle one incoming WebSocket message.
    ///
    /// # Returns
    /// * `Ok(true)` - Continue processing messages
    /// * `Ok(false)` - Server closed the stream
    pub(crate) fn handle_websocket_message(
        message: Message,
        events: &RecognitionSender,
    ) -> Result<bool, STTError> {
        match message {
            Message::Text(text) => match DeepgramMessage::parse(&text) {
                Ok(parsed) => {
                    if let Some(event) = parsed.into_event() {
                        debug!(?event, "Deepgram recognition event");
                        if events.send(event).is_err() {
                            return Ok(false);
                        }
                    }
                }
                Err(e) => warn!("Failed to parse Deepgram message: {}", e),
            },
            Message::Close(frame) => {
                info!("Deepgram WebSocket closed: {:?}", frame);
                return Ok(false);
            }
            Message::Binary(_) => debug!("Ignoring unexpected binary frame from Deepgram"),
            _ => {}
        }
        Ok(true)
    }
}

#[async_trait]
impl BaseSTT for DeepgramSTT {
    async fn connect(&mut self, events: RecognitionSender) -> Result<(), STTError> {
        if self.is_ready() {
            return Ok(());
        }

        let ws_url = self.config.build_websocket_url()?;
        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| STTError::ConfigurationError(format!("Invalid request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.base.api_key))
            .map_err(|e| STTError::ConfigurationError(format!("Invalid API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws_stream, _response) = match timeout(self.config.connect_timeout, connect_async(request)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response)))
                if response.status().as_u16() == 401 =>
            {
                return Err(STTError::AuthenticationFailed(
                    "Deepgram rejected the API key".to_string(),
                ));
            }
            Ok(Err(e)) => {
                return Err(STTError::ConnectionFailed(format!(
                    "Failed to connect to Deepgram: {e}"
                )));
            }
            Err(_) => {
                return Err(STTError::ConnectionFailed(
                    "Timed out connecting to Deepgram".to_string(),
                ));
            }
        };

        info!(model = %self.config.base.model, "Connected to Deepgram STT WebSocket");

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(AUDIO_QUEUE_SIZE);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let is_connected = self.is_connected.clone();
        let keepalive_every = self.config.keepalive_interval;
        is_connected.store(true, Ordering::Release);

        let handle = tokio::spawn(async move {
            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            let mut keepalive = interval(keepalive_every);
            keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
            keepalive.tick().await;
            let mut audio_since_tick = false;

            // `true` when the stream ended without us asking for it
            let unexpected_end = loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break false,

                    audio = audio_rx.recv() => match audio {
                        Some(chunk) => {
                            audio_since_tick = true;
                            if let Err(e) = ws_sink.send(Message::Binary(chunk)).await {
                                let err = STTError::NetworkError(format!(
                                    "Failed to send audio to Deepgram: {e}"
                                ));
                                error!("{}", err);
                                let _ = events.send(RecognitionEvent::Error(err));
                                break false;
                            }
                        }
                        None => break false,
                    },

                    _ = keepalive.tick() => {
                        if !audio_since_tick {
                            let msg = ControlMessage::KeepAlive.as_json().to_string();
                            if let Err(e) = ws_sink.send(Message::Text(msg.into())).await {
                                warn!("Failed to send Deepgram keep-alive: {}", e);
                            }
                        }
                        audio_since_tick = false;
                    }

                    message = ws_stream.next() => match message {
                        Some(Ok(msg)) => match Self::handle_websocket_message(msg, &events) {
                            Ok(true) => {}
                            Ok(false) => break true,
                            Err(e) => {
                                let _ = events.send(RecognitionEvent::Error(e));
                                break false;
                            }
                        },
                        Some(Err(e)) => {
                            let err = STTError::NetworkError(format!("WebSocket error: {e}"));
                            error!("{}", err);
                            let _ = events.send(RecognitionEvent::Error(err));
                            break false;
                        }
                        None => break true,
                    },
                }
            };

            is_connected.store(false, Ordering::Release);

            if unexpected_end {
                let _ = events.send(RecognitionEvent::Error(STTError::StreamClosed(
                    "Deepgram closed the recognition stream".to_string(),
                )));
                return;
            }

            let close = ControlMessage::CloseStream.as_json().to_string();
            if let Err(e) = ws_sink.send(Message::Text(close.into())).await {
                debug!("CloseStream not delivered: {}", e);
            }
            let _ = ws_sink.close().await;
            info!("Deepgram STT stream closed");
        });

        self.audio_tx = Some(audio_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.connection_handle = Some(handle);
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), STTError> {
        if !self.is_ready() {
            return Err(STTError::NotConnected);
        }
        let Some(tx) = &self.audio_tx else {
            return Err(STTError::NotConnected);
        };
        tx.send(audio).await.map_err(|_| {
            STTError::StreamClosed("Deepgram audio queue closed".to_string())
        })
    }

    async fn disconnect(&mut self) -> Result<(), STTError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.audio_tx = None;

        if let Some(handle) = self.connection_handle.take()
            && timeout(DISCONNECT_TIMEOUT, handle).await.is_err()
        {
            warn!("Deepgram socket task did not stop within {:?}", DISCONNECT_TIMEOUT);
        }

        self.is_connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    fn get_config(&self) -> &STTConfig {
        &self.config.base
    }

    fn get_provider_info(&self) -> &'static str {
        "deepgram"
    }
}

impl Drop for DeepgramSTT {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
