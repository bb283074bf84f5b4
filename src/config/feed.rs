use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notification feed tuning managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// Number of most recent notifications kept in memory.
    /// TOML: `feed.load_limit`. Default: `50`.
    #[serde(default = "default_load_limit")]
    pub load_limit: usize,

    /// Reconnect delay for the first attempt, doubled per attempt.
    /// TOML: `feed.backoff_base_ms`. Default: `1000`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for the reconnect delay.
    /// TOML: `feed.backoff_max_ms`. Default: `30000`.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Realtime heartbeat interval.
    /// TOML: `feed.heartbeat_secs`. Default: `25`.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// How long a channel join may stay unanswered before it counts as timed out.
    /// TOML: `feed.join_timeout_secs`. Default: `10`.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            load_limit: default_load_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl FeedConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs.max(1))
    }
}

fn default_load_limit() -> usize {
    50
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_heartbeat_secs() -> u64 {
    25
}

fn default_join_timeout_secs() -> u64 {
    10
}
