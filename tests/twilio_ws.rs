//! Media Streams over a real WebSocket.
//!
//! Runs the full router on an ephemeral port and plays Twilio's side of the
//! conversation with `tokio-tungstenite`.

mod fixtures;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use fixtures::{MockTTS, SttProbe, eventually, server_config, session_deps};
use teleagent_gateway::{AppState, build_router};

const WAIT: Duration = Duration::from_secs(3);

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct Gateway {
    addr: SocketAddr,
    state: Arc<AppState>,
    probe: SttProbe,
    tts: Arc<MockTTS>,
    shutdown: CancellationToken,
}

async fn start_gateway() -> Gateway {
    let probe = SttProbe::default();
    let tts = MockTTS::quick();
    let shutdown = CancellationToken::new();
    let state = AppState::with_deps(
        server_config(),
        session_deps(&probe, tts.clone()),
        shutdown.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await
        .unwrap();
    });

    Gateway {
        addr,
        state,
        probe,
        tts,
        shutdown,
    }
}

async fn open(gateway: &Gateway) -> Socket {
    let url = format!("ws://{}/media-stream", gateway.addr);
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

fn start_frame(call_sid: &str) -> Value {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "streamSid": "MZ-test",
        "start": {
            "accountSid": "AC-test",
            "streamSid": "MZ-test",
            "callSid": call_sid,
            "tracks": ["inbound"],
            "customParameters": {"callSid": call_sid, "caller": "+15550001111"},
            "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
        }
    })
}

/// Next JSON text frame from the gateway
async fn next_json(socket: &mut Socket) -> Option<Value> {
    loop {
        let message = timeout(WAIT, socket.next()).await.ok()??.ok()?;
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_call_over_media_stream() {
    let gateway = start_gateway().await;
    let mut socket = open(&gateway).await;

    send_json(
        &mut socket,
        json!({"event": "connected", "protocol": "Call", "version": "1.0.0"}),
    )
    .await;
    send_json(&mut socket, start_frame("CA-e2e")).await;

    // Greeting audio arrives as media frames addressed to the stream
    let frame = next_json(&mut socket).await.expect("greeting audio");
    assert_eq!(frame["event"], "media");
    assert_eq!(frame["streamSid"], "MZ-test");
    let payload = BASE64
        .decode(frame["media"]["payload"].as_str().unwrap())
        .unwrap();
    assert_eq!(payload, vec![1u8; 160]);
    assert!(gateway.state.registry.get("CA-e2e").is_some());

    // Caller audio is decoded and forwarded to the recognizer
    assert!(eventually(WAIT, || gateway.probe.connects() == 1).await);
    send_json(
        &mut socket,
        json!({
            "event": "media",
            "streamSid": "MZ-test",
            "media": {"track": "inbound", "chunk": "1", "timestamp": "20", "payload": BASE64.encode([0x55u8; 160])}
        }),
    )
    .await;
    assert!(eventually(WAIT, || !gateway.probe.audio().is_empty()).await);
    assert_eq!(&gateway.probe.audio()[0][..], &[0x55u8; 160][..]);

    // A final transcript gets a spoken reply
    gateway.probe.say("hello");
    assert!(eventually(WAIT, || gateway.tts.request_count() == 2).await);

    send_json(
        &mut socket,
        json!({"event": "stop", "streamSid": "MZ-test", "stop": {"callSid": "CA-e2e"}}),
    )
    .await;
    assert!(eventually(WAIT, || gateway.state.active_calls() == 0).await);

    gateway.shutdown.cancel();
}

#[tokio::test]
async fn test_socket_close_ends_session() {
    let gateway = start_gateway().await;
    let mut socket = open(&gateway).await;

    send_json(&mut socket, start_frame("CA-hangup")).await;
    assert!(eventually(WAIT, || gateway.state.active_calls() == 1).await);

    socket.close(None).await.unwrap();
    assert!(eventually(WAIT, || gateway.state.active_calls() == 0).await);
    assert!(eventually(WAIT, || gateway.probe.disconnects() == 1).await);

    gateway.shutdown.cancel();
}

#[tokio::test]
async fn test_stop_before_start_closes_socket() {
    let gateway = start_gateway().await;
    let mut socket = open(&gateway).await;

    send_json(&mut socket, json!({"event": "stop", "streamSid": "MZ-none"})).await;

    assert!(next_json(&mut socket).await.is_none());
    assert_eq!(gateway.state.active_calls(), 0);
    assert_eq!(gateway.tts.request_count(), 0);

    gateway.shutdown.cancel();
}

#[tokio::test]
async fn test_shutdown_hangs_up_live_calls() {
    let gateway = start_gateway().await;
    let mut socket = open(&gateway).await;

    send_json(&mut socket, start_frame("CA-shutdown")).await;
    assert!(eventually(WAIT, || gateway.state.active_calls() == 1).await);

    gateway.shutdown.cancel();
    assert!(gateway.state.registry.shutdown(WAIT).await);

    // Remaining greeting frames may still be in flight; the socket then closes
    let closed = timeout(WAIT, async {
        while let Some(Ok(message)) = socket.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
