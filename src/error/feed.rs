use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use super::backend::BackendError;

#[derive(Debug, ThisError)]
pub enum FeedError {
    /// No signed-in user; the subscription is not started.
    #[error("No current user; sign in first")]
    AuthUnresolved,

    /// List or count query failed; the feed keeps its stale state.
    #[error("Notification fetch failed: {source}")]
    FetchFailed {
        #[source]
        source: BackendError,
    },

    /// Channel reported an error or closed.
    #[error("Realtime transport error: {0}")]
    Transport(String),

    #[error("Notification {op} failed: {source}")]
    Mutation {
        op: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("Notification feed has been stopped")]
    Stopped,

    #[error("Ractor error: {0}")]
    Actor(String),
}

impl FeedError {
    pub(crate) fn fetch(source: BackendError) -> Self {
        FeedError::FetchFailed { source }
    }

    pub(crate) fn mutation(op: &'static str, source: BackendError) -> Self {
        FeedError::Mutation { op, source }
    }
}

impl IntoResponse for FeedError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            FeedError::AuthUnresolved => (
                StatusCode::UNAUTHORIZED,
                ApiErrorObject {
                    code: "AUTH_UNRESOLVED".to_string(),
                    message: "No signed-in user for the notification feed.".to_string(),
                    details: None,
                },
            ),
            FeedError::FetchFailed { .. }
            | FeedError::Mutation { .. }
            | FeedError::Transport(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    code: "BACKEND_ERROR".to_string(),
                    message: "Notification backend error.".to_string(),
                    details: None,
                },
            ),
            FeedError::Stopped => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorObject {
                    code: "FEED_STOPPED".to_string(),
                    message: "Notification feed is not running.".to_string(),
                    details: None,
                },
            ),
            FeedError::Actor(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                    details: None,
                },
            ),
        };
        (status, Json(ApiErrorBody { inner: error_body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
