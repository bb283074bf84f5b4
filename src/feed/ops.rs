use clubfeed_schema::Notification;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::NotificationStore;
use crate::error::FeedError;

/// One consistent fetch: the most recent page plus the server-side unread total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

/// Store calls made on behalf of the feed, with errors mapped into [`FeedError`].
#[derive(Clone)]
pub struct FeedOps {
    store: Arc<dyn NotificationStore>,
}

impl FeedOps {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Fetches the list and the count concurrently; either failing fails the whole load.
    pub async fn load(&self, user_id: Uuid, limit: usize) -> Result<FeedSnapshot, FeedError> {
        let (notifications, unread_count) = tokio::try_join!(
            self.store.list_recent(user_id, limit),
            self.store.unread_count(user_id),
        )
        .map_err(FeedError::fetch)?;

        Ok(FeedSnapshot {
            notifications,
            unread_count,
        })
    }

    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), FeedError> {
        self.store
            .mark_read(user_id, id)
            .await
            .map_err(|e| FeedError::mutation("mark_read", e))
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<(), FeedError> {
        self.store
            .mark_all_read(user_id)
            .await
            .map_err(|e| FeedError::mutation("mark_all_read", e))
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), FeedError> {
        self.store
            .delete(user_id, id)
            .await
            .map_err(|e| FeedError::mutation("delete", e))
    }
}
