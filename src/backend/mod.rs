//! Backend seams the notification feed depends on.
//!
//! The feed never reaches for a global client: a [`Backend`] bundle is built once at
//! startup and handed to whoever needs it, so tests can inject fakes.

pub mod supabase;

mod bootstrap;
mod subscription;

pub use bootstrap::Backend;
pub use subscription::{
    ChannelSignal, ChannelSpec, ChannelStatus, NOTIFICATIONS_TABLE, Subscription, SubscriptionCloser,
};

use crate::error::BackendError;
use async_trait::async_trait;
use clubfeed_schema::Notification;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity resolved from the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Query surface over the `notifications` table, always scoped to one user.
#[async_trait]
pub trait NotificationStore: Send + Sync + 'static {
    /// Most recent first, at most `limit` rows.
    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, BackendError>;

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), BackendError>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), BackendError>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), BackendError>;
}

/// Resolves the signed-in user, `Ok(None)` when there is no valid session.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;
}

/// Opens push subscriptions for row changes.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Issues the subscription request. Status and row changes arrive on the returned
    /// [`Subscription`]; `Subscribed` is reported there, not by this call returning.
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError>;
}
