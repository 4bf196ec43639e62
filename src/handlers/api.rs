use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::state::AppState;

/// Health check handler
/// Reports that the server is running and how many calls are live
pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "OK",
        "active_calls": state.active_calls(),
    })))
}
