mod backend;
mod basic;
mod feed;

pub use backend::{BackendConfig, BackendMode};
pub use basic::BasicConfig;
pub use feed::FeedConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Hosted or embedded backend settings (see `backend` table in config.toml).
    #[serde(default)]
    pub backend: BackendConfig,

    /// Notification feed tuning (see `feed` table in config.toml).
    #[serde(default)]
    pub feed: FeedConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "CLUBFEED_";

impl Config {
    /// Builds a Figment that merges defaults, a config TOML file and `CLUBFEED_*` env vars.
    ///
    /// Nested keys use a double underscore: `CLUBFEED_BACKEND__ANON_KEY`.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates configuration.
    ///
    /// A missing `basic.dashboard_key` is an error so the HTTP surface is never left open.
    pub fn load() -> Result<Self, figment::Error> {
        let cfg: Self = Self::figment().extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.basic.dashboard_key.trim().is_empty() {
            return Err(figment::Error::from(
                "basic.dashboard_key must be set and non-empty".to_string(),
            ));
        }
        match self.backend.mode {
            BackendMode::Supabase => {
                if self.backend.supabase_url.is_none() {
                    return Err(figment::Error::from(
                        "backend.supabase_url is required in supabase mode".to_string(),
                    ));
                }
                if self.backend.anon_key.trim().is_empty() {
                    return Err(figment::Error::from(
                        "backend.anon_key is required in supabase mode".to_string(),
                    ));
                }
            }
            BackendMode::Local => {
                if self.backend.local_user_id.is_none() {
                    return Err(figment::Error::from(
                        "backend.local_user_id is required in local mode".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
