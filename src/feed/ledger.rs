use clubfeed_schema::{Notification, NotificationChange};
use std::collections::VecDeque;
use uuid::Uuid;

use super::ops::FeedSnapshot;

/// In-memory notification list plus unread badge count (no IO, no locks).
///
/// Newest first and at most `capacity` rows; pushed inserts evict the oldest. The count is
/// what the backend last reported, adjusted by push events since; it never goes below zero.
#[derive(Debug, Clone)]
pub struct NotificationLedger {
    items: VecDeque<Notification>,
    unread: u64,
    capacity: usize,
}

impl Default for NotificationLedger {
    fn default() -> Self {
        Self::with_capacity(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    /// Insert for an id already present; nothing changed.
    Duplicate,
    Updated,
    /// Update for a row outside the loaded window.
    Untracked,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            unread: 0,
            capacity: capacity.max(1),
        }
    }

    /// Changes the row cap; rows past it are dropped. The unread count is untouched.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.items.truncate(self.capacity);
    }

    /// Replaces everything with a fresh fetch.
    pub fn replace(&mut self, snapshot: FeedSnapshot) {
        self.items = snapshot.notifications.into();
        self.items.truncate(self.capacity);
        self.unread = snapshot.unread_count;
    }

    /// Re-applies a change over a fresh snapshot: row contents only, the count is left to the
    /// server. Returns whether the change may have moved the count after the snapshot's count
    /// query ran, in which case that count can no longer be trusted.
    pub fn merge(&mut self, change: NotificationChange) -> bool {
        match change {
            NotificationChange::Insert(n) => {
                let unread = !n.is_read;
                if !self.contains(n.id) {
                    self.push_front(n);
                }
                unread
            }
            NotificationChange::Update {
                record,
                previously_read,
            } => {
                let moved = previously_read.is_none_or(|was| was != record.is_read);
                if let Some(slot) = self.items.iter_mut().find(|n| n.id == record.id) {
                    *slot = record;
                }
                moved
            }
        }
    }

    pub fn apply(&mut self, change: NotificationChange) -> ApplyOutcome {
        match change {
            NotificationChange::Insert(n) => self.apply_insert(n),
            NotificationChange::Update {
                record,
                previously_read,
            } => self.apply_update(record, previously_read),
        }
    }

    pub fn apply_insert(&mut self, notification: Notification) -> ApplyOutcome {
        if self.contains(notification.id) {
            return ApplyOutcome::Duplicate;
        }
        if !notification.is_read {
            self.unread = self.unread.saturating_add(1);
        }
        self.push_front(notification);
        ApplyOutcome::Inserted
    }

    fn push_front(&mut self, notification: Notification) {
        self.items.push_front(notification);
        self.items.truncate(self.capacity);
    }

    /// Replaces the row with the same id. The count follows the `is_read` transition, taken
    /// from the local copy when there is one, else from `previously_read`.
    pub fn apply_update(
        &mut self,
        record: Notification,
        previously_read: Option<bool>,
    ) -> ApplyOutcome {
        let now_read = record.is_read;
        match self.items.iter_mut().find(|n| n.id == record.id) {
            Some(slot) => {
                let was_read = slot.is_read;
                *slot = record;
                self.adjust(was_read, now_read);
                ApplyOutcome::Updated
            }
            None => {
                if let Some(was_read) = previously_read {
                    self.adjust(was_read, now_read);
                }
                ApplyOutcome::Untracked
            }
        }
    }

    fn adjust(&mut self, was_read: bool, now_read: bool) {
        match (was_read, now_read) {
            (false, true) => self.unread = self.unread.saturating_sub(1),
            (true, false) => self.unread = self.unread.saturating_add(1),
            _ => {}
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn notification(n: u128, is_read: bool) -> Notification {
        Notification {
            id: Uuid::from_u128(n),
            user_id: Uuid::from_u128(999),
            kind: "task_assigned".to_string(),
            title: format!("Task {n}"),
            message: "assigned".to_string(),
            related_type: Some("task".to_string()),
            related_id: None,
            is_read,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
                + Duration::minutes(n as i64),
        }
    }

    fn loaded(items: Vec<Notification>) -> NotificationLedger {
        let unread_count = items.iter().filter(|n| !n.is_read).count() as u64;
        let mut ledger = NotificationLedger::new();
        ledger.replace(FeedSnapshot {
            notifications: items,
            unread_count,
        });
        ledger
    }

    #[test]
    fn insert_prepends_and_counts_unread() {
        let mut ledger = loaded(vec![notification(2, false), notification(1, true)]);
        assert_eq!(ledger.unread_count(), 1);

        assert_eq!(
            ledger.apply_insert(notification(3, false)),
            ApplyOutcome::Inserted
        );
        let ids: Vec<u128> = ledger.to_vec().iter().map(|n| n.id.as_u128()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(ledger.unread_count(), 2);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut ledger = loaded(vec![notification(1, false)]);
        assert_eq!(
            ledger.apply_insert(notification(1, false)),
            ApplyOutcome::Duplicate
        );
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.unread_count(), 1);
    }

    #[test]
    fn unread_count_tracks_inserts_minus_reads() {
        let mut ledger = NotificationLedger::new();
        for n in 1..=5 {
            ledger.apply_insert(notification(n, false));
        }
        ledger.apply_insert(notification(6, true));
        assert_eq!(ledger.unread_count(), 5);

        for n in [2, 4] {
            ledger.apply_update(notification(n, true), None);
        }
        assert_eq!(ledger.unread_count(), 3);
    }

    #[test]
    fn read_transition_is_floored_at_zero() {
        let mut ledger = NotificationLedger::new();
        ledger.replace(FeedSnapshot {
            notifications: vec![notification(1, false)],
            unread_count: 0,
        });

        assert_eq!(
            ledger.apply_update(notification(1, true), None),
            ApplyOutcome::Updated
        );
        assert_eq!(ledger.unread_count(), 0);
    }

    #[test]
    fn repeated_read_update_decrements_once() {
        let mut ledger = loaded(vec![notification(1, false), notification(2, false)]);
        ledger.apply_update(notification(1, true), Some(false));
        ledger.apply_update(notification(1, true), Some(false));
        assert_eq!(ledger.unread_count(), 1);
        assert!(ledger.get(Uuid::from_u128(1)).unwrap().is_read);
    }

    #[test]
    fn untracked_update_uses_previous_flag_when_known() {
        let mut ledger = loaded(vec![notification(1, false), notification(2, false)]);

        assert_eq!(
            ledger.apply_update(notification(50, true), Some(false)),
            ApplyOutcome::Untracked
        );
        assert_eq!(ledger.unread_count(), 1);

        ledger.apply_update(notification(51, true), None);
        assert_eq!(ledger.unread_count(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn pushed_inserts_evict_the_oldest_past_capacity() {
        let mut ledger = NotificationLedger::with_capacity(2);
        ledger.replace(FeedSnapshot {
            notifications: vec![notification(2, false), notification(1, false)],
            unread_count: 2,
        });

        ledger.apply_insert(notification(3, false));
        let ids: Vec<u128> = ledger.to_vec().iter().map(|n| n.id.as_u128()).collect();
        assert_eq!(ids, vec![3, 2]);
        // Evicted rows are still unread on the server.
        assert_eq!(ledger.unread_count(), 3);

        ledger.set_capacity(1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.unread_count(), 3);
    }

    #[test]
    fn merge_keeps_the_server_count() {
        let mut ledger = loaded(vec![notification(2, false), notification(1, false)]);
        assert_eq!(ledger.unread_count(), 2);

        // Already in the snapshot: no new row, but the count may predate it.
        assert!(ledger.merge(NotificationChange::Insert(notification(2, false))));
        // Missing from the snapshot: the row comes back, the count stays.
        assert!(ledger.merge(NotificationChange::Insert(notification(3, false))));
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.unread_count(), 2);

        // Read update for a row outside the page.
        assert!(ledger.merge(NotificationChange::Update {
            record: notification(40, true),
            previously_read: Some(false),
        }));
        assert_eq!(ledger.unread_count(), 2);

        let mut read = notification(1, true);
        read.title = "Edited".to_string();
        assert!(ledger.merge(NotificationChange::Update {
            record: read,
            previously_read: Some(false),
        }));
        assert!(ledger.get(Uuid::from_u128(1)).unwrap().is_read);
        assert_eq!(ledger.unread_count(), 2);

        // Content-only edits and read inserts cannot move the count.
        assert!(!ledger.merge(NotificationChange::Update {
            record: notification(2, false),
            previously_read: Some(false),
        }));
        assert!(!ledger.merge(NotificationChange::Insert(notification(5, true))));
    }

    #[test]
    fn marking_unread_again_restores_the_count() {
        let mut ledger = loaded(vec![notification(1, true)]);
        ledger.apply_update(notification(1, false), None);
        assert_eq!(ledger.unread_count(), 1);
    }
}
