use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the `notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Business event category (`task_assigned`, `meeting_invite`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub related_type: Option<String>,
    #[serde(default)]
    pub related_id: Option<Uuid>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; the backend assigns `id`, `is_read` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<Uuid>,
}

/// A row change delivered over a realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationChange {
    Insert(Notification),
    Update {
        record: Notification,
        /// `is_read` before the update, when the backend ships the old row.
        previously_read: Option<bool>,
    },
}

impl NotificationChange {
    pub fn id(&self) -> Uuid {
        match self {
            NotificationChange::Insert(n) => n.id,
            NotificationChange::Update { record, .. } => record.id,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            NotificationChange::Insert(n) => n.user_id,
            NotificationChange::Update { record, .. } => record.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_reads_postgrest_row() {
        let row = json!({
            "id": "7f1c2a52-2b8e-4a36-9df6-5f5f2a0c8b11",
            "user_id": "0b7f4f8e-44a5-4b5c-8a57-0e3f5b7c9d21",
            "type": "task_assigned",
            "title": "New task",
            "message": "You were assigned to 'Quarterly report'",
            "related_type": "task",
            "related_id": null,
            "is_read": false,
            "created_at": "2025-03-01T09:30:00.123456+00:00"
        });

        let n: Notification = serde_json::from_value(row).expect("valid row");
        assert_eq!(n.kind, "task_assigned");
        assert_eq!(n.related_type.as_deref(), Some("task"));
        assert!(n.related_id.is_none());
        assert!(!n.is_read);
    }

    #[test]
    fn new_notification_omits_empty_relations() {
        let body = NewNotification {
            user_id: Uuid::nil(),
            kind: "meeting_invite".to_string(),
            title: "Standup".to_string(),
            message: "Join at 10:00".to_string(),
            related_type: None,
            related_id: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["type"], "meeting_invite");
        assert!(value.get("related_type").is_none());
        assert!(value.get("related_id").is_none());
    }
}
