use axum::{
    Form,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::twiml;

/// Fields Twilio posts to the voice webhook. Only the ones used here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboundCallForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "CallSid")]
    pub call_sid: String,
}

/// Voice webhook for inbound calls
///
/// Answers with TwiML that connects the call to the media stream endpoint.
/// The stream URL uses `PUBLIC_HOST` when configured, else the request's
/// `Host` header.
pub async fn inbound_call_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<InboundCallForm>,
) -> AppResult<Response> {
    info!(
        call_sid = %form.call_sid,
        "Incoming call: {} -> {} ({})",
        form.from,
        form.to,
        form.call_sid
    );

    let host = match &state.config.public_host {
        Some(host) => host.clone(),
        None => headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Missing Host header".to_string()))?,
    };

    let stream_url = format!("wss://{host}{}", state.config.media_stream_path);
    let body = twiml::voice_response(&stream_url, &form.call_sid, &form.from);

    Ok(([(header::CONTENT_TYPE, "application/xml")], body).into_response())
}
