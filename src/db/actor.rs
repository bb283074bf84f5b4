use crate::backend::{
    ChannelSignal, ChannelSpec, ChannelStatus, NotificationStore, RealtimeTransport, Subscription,
};
use crate::db::models::DbNotification;
use crate::db::schema::SQLITE_INIT;
use crate::error::BackendError;
use async_trait::async_trait;
use chrono::Utc;
use clubfeed_schema::{NewNotification, Notification, NotificationChange};
use futures::StreamExt;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANGE_BUFFER: usize = 1024;
const SIGNAL_BUFFER: usize = 256;

const SELECT_COLUMNS: &str =
    "seq, id, user_id, type, title, message, related_type, related_id, is_read, created_at";

#[derive(Debug)]
pub enum DbActorMessage {
    /// Insert a notification (server-side creation) and return the stored row.
    Create(NewNotification, RpcReplyPort<Result<Notification, BackendError>>),

    /// Most recent notifications for a user, newest first.
    ListRecent(
        Uuid,
        usize,
        RpcReplyPort<Result<Vec<Notification>, BackendError>>,
    ),

    /// Count of unread notifications for a user.
    UnreadCount(Uuid, RpcReplyPort<Result<u64, BackendError>>),

    /// Flip one notification to read.
    MarkRead(Uuid, Uuid, RpcReplyPort<Result<(), BackendError>>),

    /// Flip every unread notification of a user to read.
    MarkAllRead(Uuid, RpcReplyPort<Result<(), BackendError>>),

    /// Delete one notification.
    Delete(Uuid, Uuid, RpcReplyPort<Result<(), BackendError>>),
}

/// Cloneable handle to the embedded backend. Implements both the store and the realtime seam.
#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
    changes: broadcast::Sender<NotificationChange>,
    kicks: broadcast::Sender<String>,
}

impl DbActorHandle {
    pub async fn create(&self, new: NewNotification) -> Result<Notification, BackendError> {
        ractor::call!(self.actor, DbActorMessage::Create, new)
            .map_err(|e| BackendError::Actor(format!("DbActor Create RPC failed: {e}")))?
    }

    /// Drops every open realtime channel with a `CHANNEL_ERROR`, as a server restart would.
    /// Returns how many channels were told.
    pub fn kick_subscribers(&self, reason: &str) -> usize {
        self.kicks.send(reason.to_string()).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationStore for DbActorHandle {
    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError> {
        ractor::call!(self.actor, DbActorMessage::ListRecent, user_id, limit)
            .map_err(|e| BackendError::Actor(format!("DbActor ListRecent RPC failed: {e}")))?
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, BackendError> {
        ractor::call!(self.actor, DbActorMessage::UnreadCount, user_id)
            .map_err(|e| BackendError::Actor(format!("DbActor UnreadCount RPC failed: {e}")))?
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), BackendError> {
        ractor::call!(self.actor, DbActorMessage::MarkRead, user_id, id)
            .map_err(|e| BackendError::Actor(format!("DbActor MarkRead RPC failed: {e}")))?
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), BackendError> {
        ractor::call!(self.actor, DbActorMessage::MarkAllRead, user_id)
            .map_err(|e| BackendError::Actor(format!("DbActor MarkAllRead RPC failed: {e}")))?
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), BackendError> {
        ractor::call!(self.actor, DbActorMessage::Delete, user_id, id)
            .map_err(|e| BackendError::Actor(format!("DbActor Delete RPC failed: {e}")))?
    }
}

#[async_trait]
impl RealtimeTransport for DbActorHandle {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError> {
        // Receivers are created before `Subscribed` is reported so no change can slip between.
        let mut changes = BroadcastStream::new(self.changes.subscribe());
        let mut kicks = self.kicks.subscribe();
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            if signal_tx
                .send(ChannelSignal::Status(ChannelStatus::Subscribed))
                .await
                .is_err()
            {
                return;
            }
            debug!(channel = %spec.name, "Local channel subscribed");

            let final_status = loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        debug!(channel = %spec.name, "Local channel closed by subscriber");
                        return;
                    }
                    kicked = kicks.recv() => {
                        let reason = kicked.unwrap_or_else(|_| "backend shutting down".to_string());
                        break ChannelStatus::ChannelError(reason);
                    }
                    next = changes.next() => match next {
                        None => break ChannelStatus::Closed,
                        Some(Err(lagged)) => {
                            warn!(channel = %spec.name, error = %lagged, "Local channel lagged");
                            break ChannelStatus::ChannelError(lagged.to_string());
                        }
                        Some(Ok(change)) => {
                            if !delivers(&spec, &change) {
                                continue;
                            }
                            if signal_tx.send(ChannelSignal::Change(change)).await.is_err() {
                                return;
                            }
                        }
                    },
                }
            };

            let _ = signal_tx.send(ChannelSignal::Status(final_status)).await;
        });

        Ok(Subscription::new(signal_rx, close_tx))
    }
}

fn delivers(spec: &ChannelSpec, change: &NotificationChange) -> bool {
    if change.user_id() != spec.user_id {
        return false;
    }
    let event = match change {
        NotificationChange::Insert(_) => "INSERT",
        NotificationChange::Update { .. } => "UPDATE",
    };
    spec.events.iter().any(|e| e == event)
}

struct DbActorState {
    pool: SqlitePool,
    changes: broadcast::Sender<NotificationChange>,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = (String, broadcast::Sender<NotificationChange>);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (database_url, changes) = args;
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool, changes })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbActorMessage::Create(new, reply) => {
                let res = self.create(state, new).await;
                let _ = reply.send(res);
            }
            DbActorMessage::ListRecent(user_id, limit, reply) => {
                let res = self.list_recent(&state.pool, user_id, limit).await;
                let _ = reply.send(res);
            }
            DbActorMessage::UnreadCount(user_id, reply) => {
                let res = self.unread_count(&state.pool, user_id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::MarkRead(user_id, id, reply) => {
                let res = self.mark_read(state, user_id, Some(id)).await;
                let _ = reply.send(res);
            }
            DbActorMessage::MarkAllRead(user_id, reply) => {
                let res = self.mark_read(state, user_id, None).await;
                let _ = reply.send(res);
            }
            DbActorMessage::Delete(user_id, id, reply) => {
                let res = self.delete(&state.pool, user_id, id).await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

impl DbActor {
    async fn create(
        &self,
        state: &DbActorState,
        new: NewNotification,
    ) -> Result<Notification, BackendError> {
        let row = sqlx::query_as::<_, DbNotification>(&format!(
            r#"
            INSERT INTO notifications (
                id, user_id, type, title, message, related_type, related_id, is_read, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.kind)
        .bind(new.title)
        .bind(new.message)
        .bind(new.related_type)
        .bind(new.related_id)
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await?;

        let notification = Notification::from(row);
        // No subscribers is fine; the row is stored either way.
        let _ = state
            .changes
            .send(NotificationChange::Insert(notification.clone()));
        Ok(notification)
    }

    async fn list_recent(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, DbNotification>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM notifications
            WHERE user_id = ?
            ORDER BY seq DESC
            LIMIT ?
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn unread_count(&self, pool: &SqlitePool, user_id: Uuid) -> Result<u64, BackendError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Marks one (`Some(id)`) or all unread notifications read and publishes an UPDATE per row.
    async fn mark_read(
        &self,
        state: &DbActorState,
        user_id: Uuid,
        id: Option<Uuid>,
    ) -> Result<(), BackendError> {
        let rows = match id {
            Some(id) => {
                sqlx::query_as::<_, DbNotification>(&format!(
                    r#"
                    UPDATE notifications SET is_read = 1
                    WHERE user_id = ? AND id = ? AND is_read = 0
                    RETURNING {SELECT_COLUMNS}
                    "#
                ))
                .bind(user_id)
                .bind(id)
                .fetch_all(&state.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbNotification>(&format!(
                    r#"
                    UPDATE notifications SET is_read = 1
                    WHERE user_id = ? AND is_read = 0
                    RETURNING {SELECT_COLUMNS}
                    "#
                ))
                .bind(user_id)
                .fetch_all(&state.pool)
                .await?
            }
        };

        debug!(%user_id, updated = rows.len(), "notifications marked read");
        for row in rows {
            let _ = state.changes.send(NotificationChange::Update {
                record: Notification::from(row),
                previously_read: Some(false),
            });
        }
        Ok(())
    }

    async fn delete(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM notifications WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Spawn the database actor and return a cloneable handle.
///
/// The actor is unnamed so several embedded backends can live in one process.
pub async fn spawn(database_url: &str) -> Result<DbActorHandle, BackendError> {
    let (changes, _) = broadcast::channel(CHANGE_BUFFER);
    let (kicks, _) = broadcast::channel(8);

    let (actor, _jh) = Actor::spawn(None, DbActor, (database_url.to_string(), changes.clone()))
        .await
        .map_err(|e| BackendError::Actor(format!("failed to spawn DbActor: {e}")))?;

    Ok(DbActorHandle {
        actor,
        changes,
        kicks,
    })
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), BackendError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
