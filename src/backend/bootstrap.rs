use crate::backend::supabase::{SupabaseRealtime, SupabaseRest};
use crate::backend::{AuthProvider, NotificationStore, RealtimeTransport};
use crate::config::{BackendMode, Config};
use crate::db::LocalAuth;
use crate::error::BackendError;
use std::{sync::Arc, time::Duration};
use tracing::info;

/// The three seams the feed needs, built once at startup and passed down.
///
/// Keep this as a plain struct of trait objects so tests can mix real and fake parts.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn NotificationStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub realtime: Arc<dyn RealtimeTransport>,
}

impl Backend {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        auth: Arc<dyn AuthProvider>,
        realtime: Arc<dyn RealtimeTransport>,
    ) -> Self {
        Self {
            store,
            auth,
            realtime,
        }
    }

    pub async fn from_config(cfg: &Config) -> Result<Self, BackendError> {
        let backend = &cfg.backend;
        match backend.mode {
            BackendMode::Supabase => {
                let base_url = backend.supabase_url.as_ref().ok_or_else(|| {
                    BackendError::Protocol("backend.supabase_url is required".to_string())
                })?;
                let ttl = Duration::from_secs(backend.user_cache_ttl_secs.max(1));

                // Log the effective backend here so `main` stays wiring-only.
                info!(
                    mode = "supabase",
                    supabase_url = %base_url,
                    proxy = %backend.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
                    has_access_token = backend.access_token.is_some(),
                    retry_max_times = backend.retry_max_times,
                    user_cache_ttl_secs = ttl.as_secs(),
                    heartbeat_secs = cfg.feed.heartbeat().as_secs(),
                    join_timeout_secs = cfg.feed.join_timeout().as_secs(),
                    "Backend config (effective)"
                );

                let rest = Arc::new(SupabaseRest::new(
                    base_url,
                    &backend.anon_key,
                    backend.access_token.as_deref(),
                    backend.proxy.as_ref(),
                    backend.retry_max_times,
                    ttl,
                )?);
                let realtime = SupabaseRealtime::new(
                    base_url,
                    &backend.anon_key,
                    backend.access_token.as_deref(),
                    cfg.feed.heartbeat(),
                    cfg.feed.join_timeout(),
                )?;

                Ok(Self::new(rest.clone(), rest, Arc::new(realtime)))
            }
            BackendMode::Local => {
                info!(
                    mode = "local",
                    database_url = %backend.database_url,
                    local_user_id = %backend.local_user_id.map(|id| id.to_string()).unwrap_or_else(|| "<none>".to_string()),
                    "Backend config (effective)"
                );

                let db = crate::db::spawn(&backend.database_url).await?;
                let auth = match backend.local_user_id {
                    Some(user_id) => LocalAuth::signed_in(user_id),
                    None => LocalAuth::signed_out(),
                };
                let db = Arc::new(db);
                Ok(Self::new(db.clone(), Arc::new(auth), db))
            }
        }
    }
}
