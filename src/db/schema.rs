//! SQL DDL for the embedded backend.

/// SQLite schema: the `notifications` table plus an index for unread counts.
///
/// `seq` preserves insertion order; `created_at` is RFC3339 text and is not relied on for ordering.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id BLOB NOT NULL UNIQUE,
    user_id BLOB NOT NULL,
    type TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    related_type TEXT NULL,
    related_id BLOB NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_unread ON notifications(user_id, is_read);
"#;
