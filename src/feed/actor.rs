use clubfeed_schema::{Notification, NotificationChange};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ConnectionState, FeedOps, FeedSnapshot, NotificationLedger, ReconnectBackoff};
use crate::backend::{
    AuthProvider, AuthUser, Backend, ChannelSignal, ChannelSpec, ChannelStatus, RealtimeTransport,
    Subscription, SubscriptionCloser,
};
use crate::config::FeedConfig;
use crate::error::{BackendError, FeedError};

type MutationReply = RpcReplyPort<Result<(), FeedError>>;

/// Point-in-time copy of what a UI would render.
#[derive(Debug, Clone, Serialize)]
pub struct FeedView {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub state: ConnectionState,
    pub loading: bool,
    pub reconnect_attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Feed tuning resolved from [`FeedConfig`].
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub load_limit: usize,
    pub backoff: ReconnectBackoff,
}

impl From<&FeedConfig> for FeedSettings {
    fn from(cfg: &FeedConfig) -> Self {
        Self {
            load_limit: cfg.load_limit.max(1),
            backoff: ReconnectBackoff::new(cfg.backoff_base(), cfg.backoff_max()),
        }
    }
}

pub enum FeedMessage {
    // Public
    /// Sets the page size, re-fetches, and replies once the result has landed.
    Load(usize, RpcReplyPort<()>),
    /// Re-fetches without waiting.
    Refresh,
    /// Re-fetches and replies once the result has landed.
    RefreshAndWait(RpcReplyPort<()>),
    /// Marks one notification read, then refreshes.
    MarkAsRead(Uuid, MutationReply),
    /// Marks every notification of the user read, then refreshes.
    MarkAllAsRead(MutationReply),
    /// Deletes one notification, then refreshes.
    Delete(Uuid, MutationReply),
    /// Replies with a copy of the current view.
    View(RpcReplyPort<FeedView>),

    // Internal
    /// Result of the current-user lookup started in `post_start`.
    UserResolved(Result<Option<AuthUser>, BackendError>),
    /// A fetch finished; only the latest generation is applied.
    LoadComplete {
        generation: u64,
        result: Result<FeedSnapshot, FeedError>,
    },
    /// A store mutation finished; success triggers a refresh before replying.
    MutationComplete {
        op: &'static str,
        result: Result<(), FeedError>,
        reply: MutationReply,
    },
    /// Backoff elapsed (or first start): open a channel for this session.
    Connect {
        session: u64,
    },
    /// The transport answered a subscribe request.
    ChannelOpened {
        session: u64,
        result: Result<Subscription, BackendError>,
    },
    /// A status or row change forwarded from the live channel.
    Channel {
        session: u64,
        signal: ChannelSignal,
    },
    /// Deferred teardown of a failed channel, followed by a scheduled reconnect.
    Teardown {
        session: u64,
    },
}

enum Mutation {
    MarkRead(Uuid),
    MarkAllRead,
    Delete(Uuid),
}

impl Mutation {
    fn name(&self) -> &'static str {
        match self {
            Mutation::MarkRead(_) => "mark_read",
            Mutation::MarkAllRead => "mark_all_read",
            Mutation::Delete(_) => "delete",
        }
    }
}

/// Someone waiting for the next load to land.
enum LoadWaiter {
    Refresh(RpcReplyPort<()>),
    Mutation(MutationReply),
}

impl LoadWaiter {
    fn finish(self) {
        match self {
            LoadWaiter::Refresh(reply) => {
                let _ = reply.send(());
            }
            LoadWaiter::Mutation(reply) => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

struct ChannelLink {
    closer: SubscriptionCloser,
    forwarder: JoinHandle<()>,
}

impl ChannelLink {
    fn shutdown(mut self) {
        self.forwarder.abort();
        self.closer.close();
    }
}

pub struct FeedState {
    ops: FeedOps,
    auth: Arc<dyn AuthProvider>,
    realtime: Arc<dyn RealtimeTransport>,
    limit: usize,

    user: Option<AuthUser>,
    user_pending: bool,

    ledger: NotificationLedger,
    loading: bool,
    load_generation: u64,
    load_waiters: Vec<LoadWaiter>,
    // Pushes seen while a load is in flight, replayed over its snapshot.
    replay: Vec<NotificationChange>,

    connection: ConnectionState,
    // Bumped on every teardown; signals tagged with an older session are dropped.
    session: u64,
    channel: Option<ChannelLink>,
    teardown_in_flight: bool,
    resync_on_subscribe: bool,
    backoff: ReconnectBackoff,
    reconnect_timer: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

impl FeedState {
    fn view(&self) -> FeedView {
        FeedView {
            notifications: self.ledger.to_vec(),
            unread_count: self.ledger.unread_count(),
            state: self.connection,
            loading: self.loading,
            reconnect_attempt: self.backoff.attempt(),
            last_error: self.last_error.clone(),
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    fn close_channel(&mut self) {
        if let Some(link) = self.channel.take() {
            link.shutdown();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn flush_waiters(&mut self) {
        for waiter in self.load_waiters.drain(..) {
            waiter.finish();
        }
    }
}

/// Owns one user's notification list, unread count and live channel.
pub struct FeedActor;

#[ractor::async_trait]
impl Actor for FeedActor {
    type Msg = FeedMessage;
    type State = FeedState;
    type Arguments = (Backend, FeedSettings);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (backend, settings) = args;
        info!(
            load_limit = settings.load_limit,
            backoff_first_ms = settings.backoff.delay_for(1).as_millis() as u64,
            "Notification feed starting"
        );

        Ok(FeedState {
            ops: FeedOps::new(backend.store),
            auth: backend.auth,
            realtime: backend.realtime,
            limit: settings.load_limit,
            user: None,
            user_pending: true,
            ledger: NotificationLedger::with_capacity(settings.load_limit),
            loading: true,
            load_generation: 0,
            load_waiters: Vec::new(),
            replay: Vec::new(),
            connection: ConnectionState::Idle,
            session: 0,
            channel: None,
            teardown_in_flight: false,
            resync_on_subscribe: false,
            backoff: settings.backoff,
            reconnect_timer: None,
            last_error: None,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let auth = state.auth.clone();
        tokio::spawn(async move {
            let result = auth.current_user().await;
            let _ = myself.cast(FeedMessage::UserResolved(result));
        });
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.cancel_reconnect();
        state.close_channel();
        state.connection = ConnectionState::Stopped;
        info!(session = state.session, "Notification feed stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            FeedMessage::Load(limit, reply) => {
                state.limit = limit.max(1);
                state.ledger.set_capacity(state.limit);
                self.start_load(&myself, state, Some(LoadWaiter::Refresh(reply)));
            }
            FeedMessage::Refresh => {
                self.start_load(&myself, state, None);
            }
            FeedMessage::RefreshAndWait(reply) => {
                self.start_load(&myself, state, Some(LoadWaiter::Refresh(reply)));
            }
            FeedMessage::MarkAsRead(id, reply) => {
                self.start_mutation(&myself, state, Mutation::MarkRead(id), reply);
            }
            FeedMessage::MarkAllAsRead(reply) => {
                self.start_mutation(&myself, state, Mutation::MarkAllRead, reply);
            }
            FeedMessage::Delete(id, reply) => {
                self.start_mutation(&myself, state, Mutation::Delete(id), reply);
            }
            FeedMessage::View(reply) => {
                let _ = reply.send(state.view());
            }
            FeedMessage::UserResolved(result) => {
                self.handle_user_resolved(&myself, state, result);
            }
            FeedMessage::LoadComplete { generation, result } => {
                self.handle_load_complete(&myself, state, generation, result);
            }
            FeedMessage::MutationComplete { op, result, reply } => match result {
                Ok(()) => {
                    info!(op, "Notification mutation applied, refreshing");
                    self.start_load(&myself, state, Some(LoadWaiter::Mutation(reply)));
                }
                Err(e) => {
                    warn!(op, error = %e, "Notification mutation failed");
                    let _ = reply.send(Err(e));
                }
            },
            FeedMessage::Connect { session } => {
                self.handle_connect(&myself, state, session);
            }
            FeedMessage::ChannelOpened { session, result } => {
                self.handle_channel_opened(&myself, state, session, result);
            }
            FeedMessage::Channel { session, signal } => {
                self.handle_signal(&myself, state, session, signal);
            }
            FeedMessage::Teardown { session } => {
                self.handle_teardown(&myself, state, session);
            }
        }
        Ok(())
    }
}

impl FeedActor {
    fn start_load(
        &self,
        myself: &ActorRef<FeedMessage>,
        state: &mut FeedState,
        waiter: Option<LoadWaiter>,
    ) {
        state.load_waiters.extend(waiter);

        let Some(user_id) = state.user_id() else {
            if !state.user_pending {
                state.loading = false;
                state.flush_waiters();
            }
            // Otherwise the resolved user kicks off the first load.
            return;
        };

        state.load_generation += 1;
        state.loading = true;
        state.replay.clear();

        let generation = state.load_generation;
        let limit = state.limit;
        let ops = state.ops.clone();
        let myself = myself.clone();
        debug!(%user_id, generation, limit, "Loading notifications");
        tokio::spawn(async move {
            let result = ops.load(user_id, limit).await;
            let _ = myself.cast(FeedMessage::LoadComplete { generation, result });
        });
    }

    fn handle_load_complete(
        &self,
        myself: &ActorRef<FeedMessage>,
        state: &mut FeedState,
        generation: u64,
        result: Result<FeedSnapshot, FeedError>,
    ) {
        if generation != state.load_generation {
            debug!(
                generation,
                latest = state.load_generation,
                "Discarding superseded notification load"
            );
            return;
        }

        state.loading = false;
        let mut recount = false;
        match result {
            Ok(snapshot) => {
                let fetched = snapshot.notifications.len();
                state.ledger.replace(snapshot);
                let replayed = state.replay.len();
                for change in state.replay.drain(..) {
                    recount |= state.ledger.merge(change);
                }
                info!(
                    fetched,
                    replayed,
                    recount,
                    unread = state.ledger.unread_count(),
                    "Notifications loaded"
                );
            }
            Err(e) => {
                state.replay.clear();
                warn!(error = %e, "Notification load failed; keeping previous list");
            }
        }
        state.flush_waiters();

        // The server count may or may not include changes pushed mid-fetch; ask again.
        if recount {
            self.start_load(myself, state, None);
        }
    }

    fn start_mutation(
        &self,
        myself: &ActorRef<FeedMessage>,
        state: &mut FeedState,
        mutation: Mutation,
        reply: MutationReply,
    ) {
        let Some(user_id) = state.user_id() else {
            let _ = reply.send(Err(FeedError::AuthUnresolved));
            return;
        };

        let op = mutation.name();
        let ops = state.ops.clone();
        let myself = myself.clone();
        tokio::spawn(async move {
            let result = match mutation {
                Mutation::MarkRead(id) => ops.mark_read(user_id, id).await,
                Mutation::MarkAllRead => ops.mark_all_read(user_id).await,
                Mutation::Delete(id) => ops.delete(user_id, id).await,
            };
            let _ = myself.cast(FeedMessage::MutationComplete { op, result, reply });
        });
    }

    fn handle_user_resolved(
        &self,
        myself: &ActorRef<FeedMessage>,
        state: &mut FeedState,
        result: Result<Option<AuthUser>, BackendError>,
    ) {
        state.user_pending = false;
        match result {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "Notification feed user resolved");
                state.user = Some(user);
                self.start_load(myself, state, None);
                let session = state.session;
                self.handle_connect(myself, state, session);
            }
            Ok(None) => {
                warn!("No signed-in user; notification feed stays idle");
                state.last_error = Some(FeedError::AuthUnresolved.to_string());
                state.loading = false;
                state.flush_waiters();
            }
            Err(e) => {
                warn!(error = %e, "Resolving current user failed; notification feed stays idle");
                state.last_error = Some(FeedError::AuthUnresolved.to_string());
                state.loading = false;
                state.flush_waiters();
            }
        }
    }

    fn handle_connect(&self, myself: &ActorRef<FeedMessage>, state: &mut FeedState, session: u64) {
        if session != state.session {
            debug!(session, current = state.session, "Ignoring stale reconnect");
            return;
        }
        let Some(user_id) = state.user_id() else {
            return;
        };

        state.reconnect_timer = None;
        state.close_channel();
        state.connection = ConnectionState::Connecting;

        let spec = ChannelSpec::notifications(user_id);
        info!(channel = %spec.name, session, "Opening realtime channel");

        let realtime = state.realtime.clone();
        let myself = myself.clone();
        tokio::spawn(async move {
            let result = realtime.subscribe(spec).await;
            // A stopped actor drops the subscription here, which closes it.
            let _ = myself.cast(FeedMessage::ChannelOpened { session, result });
        });
    }

    fn handle_channel_opened(
        &self,
        myself: &ActorRef<FeedMessage>,
        state: &mut FeedState,
        session: u64,
        result: Result<Subscription, BackendError>,
    ) {
        if session != state.session {
            debug!(session, current = state.session, "Dropping stale subscription");
            return;
        }

        match result {
            Ok(subscription) => {
                let (mut signals, closer) = subscription.into_parts();
                let me = myself.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(signal) = signals.recv().await {
                        if me.cast(FeedMessage::Channel { session, signal }).is_err() {
                            return;
                        }
                    }
                    let _ = me.cast(FeedMessage::Channel {
                        session,
                        signal: ChannelSignal::Status(ChannelStatus::Closed),
                    });
                });
                state.channel = Some(ChannelLink { closer, forwarder });
            }
            Err(e) => {
                warn!(session, error = %e, "Realtime subscribe failed");
                state.connection = ConnectionState::Error;
                state.last_error = Some(FeedError::Transport(e.to_string()).to_string());
                self.begin_teardown(myself, state, session);
            }
        }
    }

    fn handle_signal(
        &self,
        myself: &ActorRef<FeedMessage>,
        state: &mut FeedState,
        session: u64,
        signal: ChannelSignal,
    ) {
        if session != state.session {
            debug!(session, current = state.session, "Ignoring signal from old channel");
            return;
        }

        match signal {
            ChannelSignal::Change(change) => {
                if state.loading {
                    state.replay.push(change.clone());
                }
                let id = change.id();
                let outcome = state.ledger.apply(change);
                debug!(%id, ?outcome, unread = state.ledger.unread_count(), "Applied notification change");
            }
            ChannelSignal::Status(ChannelStatus::Subscribed) => {
                state.connection = ConnectionState::Subscribed;
                state.backoff.reset();
                state.last_error = None;
                info!(session, "Realtime channel subscribed");
                if std::mem::take(&mut state.resync_on_subscribe) {
                    // Changes made while disconnected were never pushed.
                    self.start_load(myself, state, None);
                }
            }
            ChannelSignal::Status(status) => {
                if state.teardown_in_flight {
                    debug!(session, %status, "Teardown already scheduled");
                    return;
                }
                state.connection = if status == ChannelStatus::Closed {
                    ConnectionState::Closed
                } else {
                    ConnectionState::Error
                };
                warn!(session, %status, "Realtime channel lost");
                state.last_error = Some(FeedError::Transport(status.to_string()).to_string());
                self.begin_teardown(myself, state, session);
            }
        }
    }

    /// Teardown runs from the mailbox, never inside the status callback that triggered it.
    fn begin_teardown(&self, myself: &ActorRef<FeedMessage>, state: &mut FeedState, session: u64) {
        if state.teardown_in_flight {
            return;
        }
        state.teardown_in_flight = true;
        let _ = myself.cast(FeedMessage::Teardown { session });
    }

    fn handle_teardown(&self, myself: &ActorRef<FeedMessage>, state: &mut FeedState, session: u64) {
        if session != state.session {
            return;
        }

        state.close_channel();
        state.teardown_in_flight = false;
        state.session += 1;
        state.resync_on_subscribe = true;
        state.connection = ConnectionState::Backoff;

        let (attempt, delay) = state.backoff.next_delay();
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting realtime channel after backoff"
        );

        state.cancel_reconnect();
        let next = state.session;
        let me = myself.clone();
        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = me.cast(FeedMessage::Connect { session: next });
        }));
    }
}

/// Cloneable handle to a running [`FeedActor`].
#[derive(Clone)]
pub struct FeedHandle {
    actor: ActorRef<FeedMessage>,
}

impl FeedHandle {
    /// Spawns the feed; it resolves the user, loads and subscribes on its own.
    pub async fn spawn(backend: &Backend, cfg: &FeedConfig) -> Result<Self, FeedError> {
        Self::spawn_with(backend, FeedSettings::from(cfg)).await
    }

    pub async fn spawn_with(backend: &Backend, settings: FeedSettings) -> Result<Self, FeedError> {
        let (actor, _jh) = Actor::spawn(None, FeedActor, (backend.clone(), settings))
            .await
            .map_err(|e| FeedError::Actor(format!("spawn FeedActor failed: {e}")))?;
        Ok(Self { actor })
    }

    /// Re-fetches with a new page size and returns the view once it has landed.
    pub async fn load(&self, limit: usize) -> Result<FeedView, FeedError> {
        ractor::call!(self.actor, FeedMessage::Load, limit).map_err(|_| FeedError::Stopped)?;
        self.view().await
    }

    /// Re-fetches and waits for the result to be applied. Fetch errors are logged, not returned.
    pub async fn refresh(&self) -> Result<(), FeedError> {
        ractor::call!(self.actor, FeedMessage::RefreshAndWait).map_err(|_| FeedError::Stopped)
    }

    /// Fire-and-forget variant of [`FeedHandle::refresh`].
    pub fn request_refresh(&self) -> Result<(), FeedError> {
        ractor::cast!(self.actor, FeedMessage::Refresh).map_err(|_| FeedError::Stopped)
    }

    pub async fn mark_as_read(&self, id: Uuid) -> Result<(), FeedError> {
        ractor::call!(self.actor, FeedMessage::MarkAsRead, id).map_err(|_| FeedError::Stopped)?
    }

    pub async fn mark_all_as_read(&self) -> Result<(), FeedError> {
        ractor::call!(self.actor, FeedMessage::MarkAllAsRead).map_err(|_| FeedError::Stopped)?
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), FeedError> {
        ractor::call!(self.actor, FeedMessage::Delete, id).map_err(|_| FeedError::Stopped)?
    }

    pub async fn view(&self) -> Result<FeedView, FeedError> {
        ractor::call!(self.actor, FeedMessage::View).map_err(|_| FeedError::Stopped)
    }

    pub async fn snapshot(&self) -> Result<Vec<Notification>, FeedError> {
        Ok(self.view().await?.notifications)
    }

    pub async fn unread_count(&self) -> Result<u64, FeedError> {
        Ok(self.view().await?.unread_count)
    }

    pub async fn connection_state(&self) -> Result<ConnectionState, FeedError> {
        Ok(self.view().await?.state)
    }

    /// Stops the actor, closing its channel and cancelling any pending reconnect.
    /// In-flight loads and mutations finish into a dead mailbox and are dropped.
    pub async fn stop(&self) {
        if let Err(e) = self.actor.stop_and_wait(None, None).await {
            debug!(error = %e, "Feed actor already stopped");
        }
    }
}
