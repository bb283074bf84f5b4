//! Phoenix channel frames spoken by the hosted realtime service (protocol `vsn=1.0.0`).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::notification::{Notification, NotificationChange};

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_SYSTEM: &str = "system";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    pub fn join(topic: &str, config: &JoinConfig, access_token: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": config,
                "access_token": access_token,
            }),
            reference: Some(reference.to_string()),
            join_ref: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Reply payload, only for `phx_reply` frames.
    pub fn reply(&self) -> Option<ReplyPayload> {
        if self.event != EVENT_REPLY {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

impl ReplyPayload {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `config` object sent with `phx_join`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinConfig {
    pub broadcast: Value,
    pub presence: Value,
    pub postgres_changes: Vec<PostgresChangeFilter>,
    #[serde(default)]
    pub private: bool,
}

impl JoinConfig {
    pub fn postgres_changes(filters: Vec<PostgresChangeFilter>) -> Self {
        Self {
            broadcast: json!({ "ack": false, "self": false }),
            presence: json!({ "key": "" }),
            postgres_changes: filters,
            private: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostgresChangeFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Payload of a `postgres_changes` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostgresChangePayload {
    pub data: PostgresChangeRecord,
    #[serde(default)]
    pub ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostgresChangeRecord {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl PostgresChangePayload {
    /// Decodes the row change as a notification change.
    ///
    /// `Ok(None)` for DELETE events, which the feed does not subscribe to.
    pub fn into_notification_change(self) -> Result<Option<NotificationChange>, serde_json::Error> {
        let data = self.data;
        match data.kind {
            ChangeKind::Insert => {
                let record: Notification =
                    serde_json::from_value(data.record.unwrap_or(Value::Null))?;
                Ok(Some(NotificationChange::Insert(record)))
            }
            ChangeKind::Update => {
                let record: Notification =
                    serde_json::from_value(data.record.unwrap_or(Value::Null))?;
                // Without REPLICA IDENTITY FULL the old row only carries the primary key.
                let previously_read = data
                    .old_record
                    .as_ref()
                    .and_then(|old| old.get("is_read"))
                    .and_then(Value::as_bool);
                Ok(Some(NotificationChange::Update {
                    record,
                    previously_read,
                }))
            }
            ChangeKind::Delete => Ok(None),
        }
    }
}
