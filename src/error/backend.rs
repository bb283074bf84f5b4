use reqwest::StatusCode;
use thiserror::Error as ThisError;

use super::IsRetryable;

/// Failures raised by a backend adapter (hosted or embedded).
#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Unexpected backend payload: {0}")]
    Protocol(String),

    #[error("Ractor error: {0}")]
    Actor(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for BackendError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BackendError::WebSocket(e.to_string())
    }
}

impl IsRetryable for BackendError {
    fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|status| status.is_server_error())
            }
            BackendError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            BackendError::WebSocket(_) => true,
            _ => false,
        }
    }
}
