use serde::Serialize;
use std::fmt;

/// Lifecycle of the live channel behind a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No user resolved yet, or resolution failed.
    Idle,
    Connecting,
    Subscribed,
    Error,
    Closed,
    /// Waiting out a reconnect delay.
    Backoff,
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
            ConnectionState::Backoff => "backoff",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
