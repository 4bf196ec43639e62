//! Call capacity middleware for the media stream endpoint
//!
//! ```ignore
//! use axum::Router;
//! use teleagent_gateway::middleware::call_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         call_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::AppState;

/// Rejects WebSocket upgrades with 503 while every call slot is taken.
///
/// Only upgrade requests are checked (detected by the Upgrade header); other
/// requests pass through. The registry still enforces the limit when the
/// stream starts, so a call that slips past here is closed there.
pub async fn call_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade || !state.is_at_capacity() {
        return next.run(request).await;
    }

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::warn!(
        ip = %client_ip,
        active_calls = state.active_calls(),
        max_calls = ?state.registry.max_concurrent_calls(),
        "Rejecting media stream: call capacity reached"
    );
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Server at capacity. Please try again later.",
    )
        .into_response()
}
