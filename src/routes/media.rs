use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream;
use crate::middleware::call_limit_middleware;
use crate::state::AppState;

/// Create the Media Streams WebSocket router
///
/// The route path comes from configuration, so it must match the URL the
/// voice webhook puts in its TwiML.
pub fn create_media_router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &state.config.media_stream_path,
            get(media_stream::media_stream_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            call_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}
