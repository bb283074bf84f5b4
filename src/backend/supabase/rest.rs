use async_trait::async_trait;
use backon::ExponentialBuilder;
use clubfeed_schema::Notification;
use moka::sync::Cache;
use reqwest::{
    Method, StatusCode,
    header::{AUTHORIZATION, CONTENT_RANGE, HeaderValue},
};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::retry::{ensure_success, network_retry_policy, send_with_retry};
use crate::backend::{AuthProvider, AuthUser, NOTIFICATIONS_TABLE, NotificationStore};
use crate::error::BackendError;
use crate::utils::logging::with_pretty_json_debug;

const APIKEY_HEADER: &str = "apikey";
const PREFER_HEADER: &str = "prefer";
const CLIENT_USER_AGENT: &str = "clubfeed/0.1";

/// PostgREST + GoTrue client for one signed-in session.
#[derive(Clone)]
pub struct SupabaseRest {
    http: reqwest::Client,
    table_url: Url,
    user_url: Url,
    anon_key: Arc<str>,
    access_token: Option<Arc<str>>,
    retry: ExponentialBuilder,
    users: Cache<Arc<str>, AuthUser>,
}

impl SupabaseRest {
    pub fn new(
        base_url: &Url,
        anon_key: &str,
        access_token: Option<&str>,
        proxy: Option<&Url>,
        retry_max_times: usize,
        user_cache_ttl: Duration,
    ) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30));

        if let Some(proxy_url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }

        let users = Cache::builder()
            .max_capacity(64)
            .time_to_live(user_cache_ttl)
            .build();

        Ok(Self {
            http: builder.build()?,
            table_url: base_url.join(&format!("rest/v1/{NOTIFICATIONS_TABLE}"))?,
            user_url: base_url.join("auth/v1/user")?,
            anon_key: Arc::from(anon_key),
            access_token: access_token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(Arc::from),
            retry: network_retry_policy(retry_max_times),
            users,
        })
    }

    fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    fn request(&self, method: Method, url: &Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url.clone())
            .header(APIKEY_HEADER, self.anon_key.as_ref())
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer()))
    }

    fn mutation(
        &self,
        method: Method,
        filters: &[(&'static str, String)],
    ) -> reqwest::RequestBuilder {
        self.request(method, &self.table_url)
            .query(filters)
            .header(PREFER_HEADER, "return=minimal")
    }
}

/// Parses the total from a PostgREST `Content-Range` header (`0-24/3573` or `*/0`).
fn parse_content_range_total(value: &HeaderValue) -> Option<u64> {
    value
        .to_str()
        .ok()?
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}

#[async_trait]
impl NotificationStore for SupabaseRest {
    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError> {
        let query = [
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        let resp = send_with_retry("list_recent", self.retry, || {
            self.request(Method::GET, &self.table_url).query(&query)
        })
        .await?;
        let rows: Vec<Notification> = ensure_success(resp).await?.json().await?;

        with_pretty_json_debug(&rows, |pretty| {
            debug!(%user_id, rows = rows.len(), body = %pretty, "notifications fetched");
        });
        Ok(rows)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, BackendError> {
        let query = [
            ("select", "id".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("is_read", "eq.false".to_string()),
        ];
        let resp = send_with_retry("unread_count", self.retry, || {
            self.request(Method::HEAD, &self.table_url)
                .query(&query)
                .header(PREFER_HEADER, "count=exact")
        })
        .await?;
        let resp = ensure_success(resp).await?;

        resp.headers()
            .get(CONTENT_RANGE)
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                BackendError::Protocol("unread count response without Content-Range".to_string())
            })
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), BackendError> {
        let filters = [("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))];
        let body = json!({ "is_read": true });
        let resp = send_with_retry("mark_read", self.retry, || {
            self.mutation(Method::PATCH, &filters).json(&body)
        })
        .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), BackendError> {
        let filters = [
            ("user_id", format!("eq.{user_id}")),
            ("is_read", "eq.false".to_string()),
        ];
        let body = json!({ "is_read": true });
        let resp = send_with_retry("mark_all_read", self.retry, || {
            self.mutation(Method::PATCH, &filters).json(&body)
        })
        .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), BackendError> {
        let filters = [("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))];
        let resp = send_with_retry("delete", self.retry, || {
            self.mutation(Method::DELETE, &filters)
        })
        .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for SupabaseRest {
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let Some(token) = self.access_token.clone() else {
            return Ok(None);
        };

        if let Some(user) = self.users.get(&token) {
            return Ok(Some(user));
        }

        let resp = send_with_retry("get_user", self.retry, || {
            self.request(Method::GET, &self.user_url)
        })
        .await?;

        if matches!(
            resp.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!(status = %resp.status(), "Session token rejected by auth service");
            return Ok(None);
        }

        let user: AuthUser = ensure_success(resp).await?.json().await?;
        self.users.insert(token, user.clone());
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(
            parse_content_range_total(&HeaderValue::from_static("0-24/3573")),
            Some(3573)
        );
        assert_eq!(
            parse_content_range_total(&HeaderValue::from_static("*/0")),
            Some(0)
        );
        assert_eq!(
            parse_content_range_total(&HeaderValue::from_static("0-24/*")),
            None
        );
    }

    #[test]
    fn missing_access_token_falls_back_to_anon_bearer() {
        let base = Url::parse("https://demo.supabase.co").unwrap();
        let rest =
            SupabaseRest::new(&base, "anon", Some("  "), None, 0, Duration::from_secs(1)).unwrap();
        assert_eq!(rest.bearer(), "anon");
        assert_eq!(
            rest.table_url.as_str(),
            "https://demo.supabase.co/rest/v1/notifications"
        );
        assert_eq!(rest.user_url.as_str(), "https://demo.supabase.co/auth/v1/user");
    }
}
