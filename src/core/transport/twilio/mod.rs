//! Twilio Media Streams transport.
//!
//! [`TwilioTransport::listen`] returns the acceptor used by the WebSocket
//! handler together with the [`ConnectionStream`] consumed by the session
//! registry. [`MediaStreamCodec`] turns raw Media Streams frames into
//! [`StreamAction`]s and encodes outbound audio back into frames.

mod messages;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

pub use messages::{
    DtmfPayload, InboundMessage, MarkPayload, MediaFormat, MediaPayload, OutboundMessage,
    StartPayload, StopPayload,
};

use super::{
    CallConnection, CallMetadata, ConnectionStream, OutboundAudio, TransportError, TransportEvent,
};

/// How long a freshly upgraded socket may take to send its `start` frame
pub const START_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending calls waiting for the registry to pick them up
const ACCEPT_QUEUE_SIZE: usize = 64;

/// Acceptor for Media Streams calls. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TwilioTransport {
    path: Arc<str>,
    acceptor: mpsc::Sender<CallConnection>,
}

impl TwilioTransport {
    /// Start accepting calls on `path`
    pub fn listen(path: impl Into<String>) -> (Self, ConnectionStream) {
        let (tx, rx) = mpsc::channel(ACCEPT_QUEUE_SIZE);
        let transport = Self {
            path: Arc::from(path.into()),
            acceptor: tx,
        };
        (transport, ConnectionStream::new(rx))
    }

    /// WebSocket path the transport serves
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Hand a new call to whoever consumes the connection stream
    pub async fn accept(&self, connection: CallConnection) -> Result<(), TransportError> {
        self.acceptor
            .send(connection)
            .await
            .map_err(|_| TransportError::ListenerClosed)
    }

    pub fn is_listening(&self) -> bool {
        !self.acceptor.is_closed()
    }
}

/// What the socket driver should do with one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamAction {
    /// The stream started; the call can be handed to the registry
    Started(CallMetadata),
    /// Caller audio
    Audio(Bytes),
    /// Informational event for the session
    Event(TransportEvent),
    /// Twilio ended the stream
    Stopped,
    Ignore,
}

/// Stateful Media Streams frame codec for one socket
#[derive(Debug, Default)]
pub struct MediaStreamCodec {
    stream_sid: Option<String>,
}

impl MediaStreamCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn decode(&mut self, text: &str) -> Result<StreamAction, TransportError> {
        let message = InboundMessage::parse(text)
            .map_err(|e| TransportError::Protocol(format!("Invalid Media Streams frame: {e}")))?;

        Ok(match message {
            InboundMessage::Connected { protocol, version } => {
                debug!(?protocol, ?version, "Media stream connected");
                StreamAction::Ignore
            }
            InboundMessage::Start { stream_sid, start } => {
                let stream_sid = stream_sid.unwrap_or_else(|| start.stream_sid.clone());
                self.stream_sid = Some(stream_sid.clone());

                let call_sid = start
                    .call_sid
                    .clone()
                    .or_else(|| start.custom_parameters.get("callSid").cloned());
                let caller = start.custom_parameters.get("caller").cloned();

                StreamAction::Started(CallMetadata {
                    call_sid,
                    stream_sid: Some(stream_sid),
                    account_sid: start.account_sid,
                    caller,
                    parameters: start.custom_parameters,
                })
            }
            InboundMessage::Media { media } => {
                if !media.is_inbound() {
                    return Ok(StreamAction::Ignore);
                }
                let audio = media
                    .decode()
                    .map_err(|e| TransportError::Protocol(format!("Invalid media payload: {e}")))?;
                StreamAction::Audio(Bytes::from(audio))
            }
            InboundMessage::Mark { mark } => {
                StreamAction::Event(TransportEvent::Mark { name: mark.name })
            }
            InboundMessage::Dtmf { dtmf } => {
                StreamAction::Event(TransportEvent::Dtmf { digit: dtmf.digit })
            }
            InboundMessage::Stop { .. } => StreamAction::Stopped,
            InboundMessage::Unknown => StreamAction::Ignore,
        })
    }

    /// Encode outbound audio as a Media Streams frame.
    ///
    /// Fails until `start` has been seen, since every outbound frame must name
    /// its stream.
    pub fn encode(&self, audio: &OutboundAudio) -> Result<String, TransportError> {
        let stream_sid = self
            .stream_sid
            .as_deref()
            .ok_or_else(|| TransportError::Protocol("Stream has not started".to_string()))?;

        let message = match audio {
            OutboundAudio::Media(bytes) => OutboundMessage::media(stream_sid, bytes),
            OutboundAudio::Clear => OutboundMessage::clear(stream_sid),
        };
        message
            .to_json()
            .map_err(|e| TransportError::Protocol(format!("Failed to encode frame: {e}")))
    }
}

/// Stable identifier for a call: the call SID, else the stream SID, else a
/// random id
pub fn call_id(metadata: &CallMetadata) -> String {
    metadata
        .call_sid
        .clone()
        .filter(|sid| !sid.is_empty())
        .or_else(|| metadata.stream_sid.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
