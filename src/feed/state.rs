use crate::models::{Notification, NotificationId};

/// Client-side view of the caller's notifications.
///
/// Every mutation keeps `unread_count` equal to the number of entries with
/// `is_read == false`. The feed applies each mutation inside a single
/// `send_modify`, so subscribers never observe a half-applied change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_connected: bool,
}

impl FeedSnapshot {
    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub(crate) fn replace(&mut self, notifications: Vec<Notification>) {
        self.unread_count = notifications.iter().filter(|n| !n.is_read).count();
        self.notifications = notifications;
    }

    /// Returns true if an unread entry was flipped.
    pub(crate) fn mark_read(&mut self, id: NotificationId) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn mark_all_read(&mut self) {
        for n in &mut self.notifications {
            n.is_read = true;
        }
        self.unread_count = 0;
    }

    pub(crate) fn remove(&mut self, id: NotificationId) -> Option<Notification> {
        let idx = self.notifications.iter().position(|n| n.id == id)?;
        let removed = self.notifications.remove(idx);
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        Some(removed)
    }

    pub(crate) fn clear(&mut self) {
        self.notifications.clear();
        self.unread_count = 0;
    }

    /// Prepend a live delivery. A redelivered id replaces the older entry.
    pub(crate) fn push(&mut self, notification: Notification) {
        self.remove(notification.id);
        if !notification.is_read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
    }

    #[cfg(test)]
    pub(crate) fn counted_unread(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }
}
