//! Twilio Media Streams WebSocket handler
//!
//! Each socket waits for Twilio's `start` frame, registers the call with the
//! transport, then pumps frames both ways until either side ends the call.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::core::transport::twilio::{MediaStreamCodec, START_TIMEOUT, StreamAction, call_id};
use crate::core::transport::{
    CallConnection, CallMetadata, ConnectionPeer, TransportError, TransportEvent,
};
use crate::state::AppState;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Media Streams WebSocket handler
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("Media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut codec = MediaStreamCodec::new();

    let metadata = match timeout(START_TIMEOUT, wait_for_start(&mut receiver, &mut codec)).await {
        Ok(Ok(metadata)) => metadata,
        Ok(Err(e)) => {
            warn!(error = %e, "Media stream ended before start");
            let _ = sender.close().await;
            return;
        }
        Err(_) => {
            warn!(error = %TransportError::HandshakeTimeout, "Media stream never started");
            let _ = sender.close().await;
            return;
        }
    };

    let call_id = call_id(&metadata);
    let (connection, peer) = CallConnection::channel(call_id.clone(), metadata);
    if let Err(e) = state.transport.accept(connection).await {
        error!(call_id = %call_id, error = %e, "Failed to hand call to dispatcher");
        let _ = sender.close().await;
        return;
    }
    info!(call_id = %call_id, stream_sid = ?codec.stream_sid(), "Media stream started");

    let reason = pump(&call_id, &mut codec, &mut sender, &mut receiver, peer).await;
    info!(call_id = %call_id, reason = %reason, "Media stream ended");
    let _ = sender.close().await;
}

/// Read frames until `start`, skipping `connected` and anything unknown
async fn wait_for_start(
    receiver: &mut SplitStream<WebSocket>,
    codec: &mut MediaStreamCodec,
) -> Result<CallMetadata, TransportError> {
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Protocol(e.to_string())),
        };
        match codec.decode(text.as_str())? {
            StreamAction::Started(metadata) => return Ok(metadata),
            StreamAction::Stopped => break,
            _ => continue,
        }
    }
    Err(TransportError::ConnectionClosed)
}

/// Move frames between the socket and the session until the call ends.
/// Returns the reason, which is also reported to the session.
async fn pump(
    call_id: &str,
    codec: &mut MediaStreamCodec,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    mut peer: ConnectionPeer,
) -> String {
    let mut dropped_frames: u64 = 0;

    let reason = loop {
        tokio::select! {
            biased;

            _ = peer.close_token.cancelled() => break "session closed".to_string(),

            outbound = peer.outbound.recv() => {
                let Some(audio) = outbound else {
                    break "session closed".to_string();
                };
                let frame = match codec.encode(&audio) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(call_id = %call_id, error = %e, "Failed to encode outbound frame");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(frame.into())).await {
                    break format!("send failed: {e}");
                }
            }

            message = receiver.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break "socket closed".to_string(),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break format!("socket error: {e}"),
                };
                match codec.decode(text.as_str()) {
                    Ok(StreamAction::Audio(audio)) => {
                        if !peer.push_audio(audio) {
                            dropped_frames += 1;
                            if dropped_frames.is_power_of_two() {
                                debug!(call_id = %call_id, dropped_frames, "Dropping caller audio under backpressure");
                            }
                        }
                    }
                    Ok(StreamAction::Event(event)) => {
                        peer.emit(event);
                    }
                    Ok(StreamAction::Stopped) => break "stream stopped".to_string(),
                    Ok(StreamAction::Started(_)) => {
                        warn!(call_id = %call_id, "Ignoring repeated start frame");
                    }
                    Ok(StreamAction::Ignore) => {}
                    Err(e) => warn!(call_id = %call_id, error = %e, "Ignoring malformed frame"),
                }
            }
        }
    };

    peer.emit(TransportEvent::Disconnected {
        reason: reason.clone(),
    });
    reason
}
