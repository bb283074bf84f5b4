pub mod notification;
pub mod realtime;

pub use notification::{NewNotification, Notification, NotificationChange};
pub use realtime::{
    ChangeKind, JoinConfig, PhoenixFrame, PostgresChangeFilter, PostgresChangePayload,
    PostgresChangeRecord, ReplyPayload,
};
