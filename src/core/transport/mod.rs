//! Call transport abstraction.
//!
//! A [`CallConnection`] is the session's view of one live phone call: a
//! receiver of inbound caller audio, a sender for outbound audio, a stream of
//! [`TransportEvent`]s and a close switch. The transport side of the same call
//! is a [`ConnectionPeer`], created together with the connection by
//! [`CallConnection::channel`].
//!
//! Transports announce new calls through a [`ConnectionStream`].

pub mod twilio;

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use twilio::TwilioTransport;

/// Buffer size for per-call audio channels
pub const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Buffer size for per-call transport events
const EVENT_BUFFER_SIZE: usize = 32;

/// Error types for call transports
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection listener closed")]
    ListenerClosed,
    #[error("Call connection closed")]
    ConnectionClosed,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Stream handshake timed out")]
    HandshakeTimeout,
}

/// Descriptive data about a call, gathered when its stream starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMetadata {
    pub call_sid: Option<String>,
    pub stream_sid: Option<String>,
    pub account_sid: Option<String>,
    /// Caller number, when the call webhook forwarded it
    pub caller: Option<String>,
    /// Custom `<Parameter>` values from the TwiML `<Stream>`
    pub parameters: HashMap<String, String>,
}

/// Out-of-band events reported by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote side hung up or the socket failed
    Disconnected { reason: String },
    /// Playback reached a named mark
    Mark { name: String },
    /// Caller pressed a key
    Dtmf { digit: String },
}

/// Audio submitted by the session toward the caller
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAudio {
    /// Audio in the call's native encoding
    Media(Bytes),
    /// Discard anything the transport has buffered but not yet played
    Clear,
}

/// Session-side half of one live call
#[derive(Debug)]
pub struct CallConnection {
    id: String,
    metadata: CallMetadata,
    inbound_audio: Option<mpsc::Receiver<Bytes>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    outbound: mpsc::Sender<OutboundAudio>,
    close_token: CancellationToken,
}

/// Transport-side half of one live call
#[derive(Debug)]
pub struct ConnectionPeer {
    pub inbound_audio: mpsc::Sender<Bytes>,
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<OutboundAudio>,
    pub close_token: CancellationToken,
}

impl CallConnection {
    /// Create a connected pair of call halves
    pub fn channel(id: impl Into<String>, metadata: CallMetadata) -> (Self, ConnectionPeer) {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let close_token = CancellationToken::new();

        let connection = Self {
            id: id.into(),
            metadata,
            inbound_audio: Some(inbound_rx),
            events: Some(events_rx),
            outbound: outbound_tx,
            close_token: close_token.clone(),
        };
        let peer = ConnectionPeer {
            inbound_audio: inbound_tx,
            events: events_tx,
            outbound: outbound_rx,
            close_token,
        };
        (connection, peer)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }

    /// Take the inbound audio receiver. Returns `None` on the second call.
    pub fn take_inbound_audio(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.inbound_audio.take()
    }

    /// Take the transport event receiver. Returns `None` on the second call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    /// Sender for outbound audio
    pub fn outbound(&self) -> mpsc::Sender<OutboundAudio> {
        self.outbound.clone()
    }

    /// Ask the transport to hang up. Idempotent.
    pub fn close(&self) {
        self.close_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close_token.is_cancelled()
    }
}

impl ConnectionPeer {
    /// Forward caller audio without blocking. Returns `false` when the frame
    /// was dropped because the session is behind or gone.
    pub fn push_audio(&self, audio: Bytes) -> bool {
        self.inbound_audio.try_send(audio).is_ok()
    }

    /// Report an out-of-band event without blocking
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.try_send(event).is_ok()
    }

    /// Resolves once the session asked to close the call
    pub async fn closed(&self) {
        self.close_token.cancelled().await
    }
}

/// Stream of newly accepted calls
#[derive(Debug)]
pub struct ConnectionStream {
    rx: mpsc::Receiver<CallConnection>,
}

impl ConnectionStream {
    pub(crate) fn new(rx: mpsc::Receiver<CallConnection>) -> Self {
        Self { rx }
    }

    /// Receive the next call; `None` once every acceptor is gone
    pub async fn recv(&mut self) -> Option<CallConnection> {
        self.rx.recv().await
    }
}

impl Stream for ConnectionStream {
    type Item = CallConnection;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
