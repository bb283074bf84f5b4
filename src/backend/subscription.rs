use clubfeed_schema::{NotificationChange, PostgresChangeFilter};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub const NOTIFICATIONS_TABLE: &str = "notifications";
const PUBLIC_SCHEMA: &str = "public";

/// What to subscribe to: one table, filtered to one user's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub user_id: Uuid,
    /// Change events to deliver (`INSERT`, `UPDATE`).
    pub events: Vec<String>,
}

impl ChannelSpec {
    /// `notifications-<user_id>` channel delivering INSERT and UPDATE rows for one user.
    pub fn notifications(user_id: Uuid) -> Self {
        Self {
            name: format!("notifications-{user_id}"),
            schema: PUBLIC_SCHEMA.to_string(),
            table: NOTIFICATIONS_TABLE.to_string(),
            user_id,
            events: vec!["INSERT".to_string(), "UPDATE".to_string()],
        }
    }

    /// PostgREST-style row filter, `user_id=eq.<id>`.
    pub fn filter(&self) -> String {
        format!("user_id=eq.{}", self.user_id)
    }

    pub fn postgres_filters(&self) -> Vec<PostgresChangeFilter> {
        self.events
            .iter()
            .map(|event| PostgresChangeFilter {
                event: event.clone(),
                schema: self.schema.clone(),
                table: self.table.clone(),
                filter: Some(self.filter()),
            })
            .collect()
    }
}

/// Channel status as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Subscribed => f.write_str("SUBSCRIBED"),
            ChannelStatus::ChannelError(reason) => write!(f, "CHANNEL_ERROR ({reason})"),
            ChannelStatus::TimedOut => f.write_str("TIMED_OUT"),
            ChannelStatus::Closed => f.write_str("CLOSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Status(ChannelStatus),
    Change(NotificationChange),
}

/// A live channel. Dropping it (or calling [`Subscription::close`]) asks the transport to
/// leave the channel; the signal stream ends shortly after.
#[derive(Debug)]
pub struct Subscription {
    signals: mpsc::Receiver<ChannelSignal>,
    close: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(signals: mpsc::Receiver<ChannelSignal>, close: oneshot::Sender<()>) -> Self {
        Self {
            signals,
            close: Some(close),
        }
    }

    /// Splits into the signal receiver and a close guard that leaves the channel when dropped.
    pub fn into_parts(mut self) -> (mpsc::Receiver<ChannelSignal>, SubscriptionCloser) {
        let close = self.close.take();
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let signals = std::mem::replace(&mut self.signals, rx);
        (signals, SubscriptionCloser { close })
    }

    pub async fn recv(&mut self) -> Option<ChannelSignal> {
        self.signals.recv().await
    }

    pub fn close(mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Leaves the channel when closed or dropped. Closing twice is a no-op.
#[derive(Debug)]
pub struct SubscriptionCloser {
    close: Option<oneshot::Sender<()>>,
}

impl SubscriptionCloser {
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

impl Drop for SubscriptionCloser {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_channel_is_keyed_by_user() {
        let user = Uuid::parse_str("0b7f4f8e-44a5-4b5c-8a57-0e3f5b7c9d21").unwrap();
        let spec = ChannelSpec::notifications(user);

        assert_eq!(spec.name, format!("notifications-{user}"));
        assert_eq!(spec.filter(), format!("user_id=eq.{user}"));

        let filters = spec.postgres_filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].event, "INSERT");
        assert_eq!(filters[1].event, "UPDATE");
        assert!(filters.iter().all(|f| f.table == "notifications"));
    }

    #[tokio::test]
    async fn closing_a_subscription_notifies_the_transport_once() {
        let (_tx, rx) = mpsc::channel(4);
        let (close_tx, close_rx) = oneshot::channel();
        let sub = Subscription::new(rx, close_tx);

        let (_signals, mut closer) = sub.into_parts();
        closer.close();
        closer.close();

        assert!(close_rx.await.is_ok());
    }

    #[test]
    fn status_displays_transport_names() {
        assert_eq!(ChannelStatus::Subscribed.to_string(), "SUBSCRIBED");
        assert_eq!(
            ChannelStatus::ChannelError("heartbeat timeout".into()).to_string(),
            "CHANNEL_ERROR (heartbeat timeout)"
        );
    }
}
