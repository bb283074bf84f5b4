use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Which backend the feed talks to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Hosted Supabase project (PostgREST + GoTrue + Realtime).
    Supabase,
    /// Embedded SQLite store with in-process change fan-out.
    #[default]
    Local,
}

/// Backend configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// TOML: `backend.mode`. Default: `local`.
    #[serde(default)]
    pub mode: BackendMode,

    /// Project base URL, e.g. `https://xyzcompany.supabase.co`.
    /// TOML: `backend.supabase_url`. Required in `supabase` mode.
    #[serde(default)]
    pub supabase_url: Option<Url>,

    /// Public anon key sent as `apikey` on every request.
    /// TOML: `backend.anon_key`. Required in `supabase` mode.
    #[serde(default)]
    pub anon_key: String,

    /// Session access token (JWT) of the signed-in user.
    /// TOML: `backend.access_token`. Without it the current user cannot be resolved.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Optional upstream HTTP proxy for the REST client.
    /// TOML: `backend.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Max retry attempts for transient REST failures (connect errors, timeouts, 5xx).
    /// TOML: `backend.retry_max_times`. Default: `2`.
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: usize,

    /// How long a resolved user stays cached, in seconds.
    /// TOML: `backend.user_cache_ttl_secs`. Default: `60`.
    #[serde(default = "default_user_cache_ttl_secs")]
    pub user_cache_ttl_secs: u64,

    /// SQLite URL for the embedded backend.
    /// TOML: `backend.database_url`. Default: `sqlite://clubfeed.db`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Identity the embedded backend reports as signed in.
    /// TOML: `backend.local_user_id`. Required in `local` mode.
    #[serde(default)]
    pub local_user_id: Option<Uuid>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            supabase_url: None,
            anon_key: String::new(),
            access_token: None,
            proxy: None,
            retry_max_times: default_retry_max_times(),
            user_cache_ttl_secs: default_user_cache_ttl_secs(),
            database_url: default_database_url(),
            local_user_id: None,
        }
    }
}

fn default_retry_max_times() -> usize {
    2
}

fn default_user_cache_ttl_secs() -> u64 {
    60
}

fn default_database_url() -> String {
    "sqlite://clubfeed.db".to_string()
}
