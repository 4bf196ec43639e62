use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::voice;
use crate::state::AppState;

/// Create the router for Twilio's voice webhook
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice/inbound", post(voice::inbound_call_handler))
        .layer(TraceLayer::new_for_http())
}
