use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::core::registry::RegistryError;
use crate::core::transport::TransportError;

/// Application error type for HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                "Internal server error"
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                "Bad request"
            }
            AppError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                "Resource not found"
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                "Service unavailable"
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<Box<dyn std::error::Error>> for AppError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ListenerClosed => AppError::ServiceUnavailable(err.to_string()),
            TransportError::Protocol(_) | TransportError::HandshakeTimeout => {
                AppError::BadRequest(err.to_string())
            }
            TransportError::ConnectionClosed => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AtCapacity(_) | RegistryError::ShuttingDown => {
                AppError::ServiceUnavailable(err.to_string())
            }
            RegistryError::DuplicateCall(_) => AppError::BadRequest(err.to_string()),
            RegistryError::Session(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
