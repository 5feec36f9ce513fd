//! Notification feed: the single owner of the caller's notification list.
//!
//! Views receive a cloned [`NotificationFeed`] handle and read consistent
//! [`FeedSnapshot`]s from it; the only way to mutate the list is through the
//! operations below. Writes are applied locally first and then confirmed
//! against the backend; a failed confirmation is logged and, unless
//! [`WriteFailurePolicy::Refetch`] is selected, the local change stands.

pub mod state;
pub mod view;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::NotificationApi;
use crate::errors::FeedError;
use crate::models::{Notification, NotificationId};
use crate::session::Session;

pub use state::FeedSnapshot;

pub const FETCH_ERROR_MESSAGE: &str = "Failed to fetch notifications";

/// What to do when a backend write fails after the optimistic local update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Log and keep the local change; state reconciles on the next fetch.
    #[default]
    Ignore,
    /// Log, then re-fetch the full list from the backend.
    Refetch,
}

struct Inner {
    api: Arc<dyn NotificationApi>,
    session: Option<Session>,
    policy: WriteFailurePolicy,
    state: watch::Sender<FeedSnapshot>,
    fetch_generation: AtomicU64,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct NotificationFeed {
    inner: Arc<Inner>,
}

impl NotificationFeed {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        session: Option<Session>,
        policy: WriteFailurePolicy,
    ) -> Self {
        let (state, _) = watch::channel(FeedSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                api,
                session,
                policy,
                state,
                fetch_generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.inner.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_some()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Change stream for views; every update carries a full, consistent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state.borrow().unread_count
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stop accepting results. In-flight fetches that complete afterwards are discarded.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.state.send_modify(|s| {
            s.is_connected = false;
            s.is_loading = false;
        });
    }

    /// Replace the local list with the backend's. Without a session this is a no-op.
    pub async fn fetch_all(&self) {
        let Some(session) = self.inner.session.as_ref() else {
            debug!("fetch skipped: no credential");
            return;
        };
        if self.is_closed() {
            return;
        }

        let generation = self.inner.fetch_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let result = self.inner.api.list(session).await;

        if self.is_closed() || self.inner.fetch_generation.load(Ordering::Acquire) != generation {
            debug!(generation, "discarding superseded notification fetch");
            return;
        }

        match result {
            Ok(list) => {
                info!(count = list.len(), "notifications fetched");
                self.inner.state.send_modify(|s| {
                    s.replace(list);
                    s.is_loading = false;
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch notifications");
                self.inner.state.send_modify(|s| {
                    s.error = Some(FETCH_ERROR_MESSAGE.to_string());
                    s.is_loading = false;
                });
            }
        }
    }

    pub async fn mark_as_read(&self, id: NotificationId) {
        self.inner.state.send_modify(|s| {
            s.mark_read(id);
        });

        let Some(session) = self.inner.session.as_ref() else {
            debug!(notification_id = id, "mark_as_read not confirmed: no credential");
            return;
        };
        let result = self.inner.api.mark_read(session, id).await;
        self.settle_write("mark_as_read", Some(id), result).await;
    }

    pub async fn mark_all_as_read(&self) {
        self.inner.state.send_modify(FeedSnapshot::mark_all_read);

        let Some(session) = self.inner.session.as_ref() else {
            debug!("mark_all_as_read not confirmed: no credential");
            return;
        };
        let result = self.inner.api.mark_all_read(session).await;
        self.settle_write("mark_all_as_read", None, result).await;
    }

    pub async fn delete_notification(&self, id: NotificationId) {
        self.inner.state.send_modify(|s| {
            s.remove(id);
        });

        let Some(session) = self.inner.session.as_ref() else {
            debug!(notification_id = id, "delete not confirmed: no credential");
            return;
        };
        let result = self.inner.api.delete(session, id).await;
        self.settle_write("delete_notification", Some(id), result).await;
    }

    pub async fn clear_all_notifications(&self) {
        self.inner.state.send_modify(FeedSnapshot::clear);

        let Some(session) = self.inner.session.as_ref() else {
            debug!("clear_all not confirmed: no credential");
            return;
        };
        let result = self.inner.api.clear_all(session).await;
        self.settle_write("clear_all_notifications", None, result).await;
    }

    /// Mark the entry read if needed and return where it points.
    pub async fn open(&self, id: NotificationId) -> Option<String> {
        let (was_unread, link) = {
            let snapshot = self.inner.state.borrow();
            let n = snapshot.get(id)?;
            (!n.is_read, view::project_link(n))
        };
        if was_unread {
            self.mark_as_read(id).await;
        }
        link
    }

    pub(crate) fn push(&self, notification: Notification) {
        if self.is_closed() {
            return;
        }
        debug!(notification_id = notification.id, kind = %notification.kind, "notification pushed");
        self.inner.state.send_modify(|s| s.push(notification));
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.inner.state.send_if_modified(|s| {
            if s.is_connected == connected {
                return false;
            }
            s.is_connected = connected;
            true
        });
    }

    async fn settle_write(
        &self,
        op: &'static str,
        id: Option<NotificationId>,
        result: Result<(), FeedError>,
    ) {
        let Err(e) = result else {
            debug!(op, notification_id = ?id, "write confirmed");
            return;
        };
        warn!(op, notification_id = ?id, error = %e, "backend rejected write; local state kept");
        if self.inner.policy == WriteFailurePolicy::Refetch {
            self.fetch_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationCount, NotificationKind};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeApi {
        list: Mutex<Vec<Notification>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        calls: Mutex<Vec<String>>,
        /// When set, `list()` answers with the list as of the call, but only once released.
        gate: Option<Arc<Notify>>,
    }

    impl FakeApi {
        fn record(&self, call: String) -> Result<(), FeedError> {
            let fail = if call == "list" || call == "count" {
                &self.fail_reads
            } else {
                &self.fail_writes
            };
            self.calls.lock().unwrap().push(call);
            if fail.load(Ordering::SeqCst) {
                Err(FeedError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "down".into(),
                })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn list(&self, _: &Session) -> Result<Vec<Notification>, FeedError> {
            self.record("list".into())?;
            let list = self.list.lock().unwrap().clone();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(list)
        }
        async fn count(&self, _: &Session) -> Result<NotificationCount, FeedError> {
            self.record("count".into())?;
            Ok(NotificationCount::default())
        }
        async fn mark_read(&self, _: &Session, id: NotificationId) -> Result<(), FeedError> {
            self.record(format!("read {}", id))
        }
        async fn mark_all_read(&self, _: &Session) -> Result<(), FeedError> {
            self.record("read-all".into())
        }
        async fn delete(&self, _: &Session, id: NotificationId) -> Result<(), FeedError> {
            self.record(format!("delete {}", id))
        }
        async fn clear_all(&self, _: &Session) -> Result<(), FeedError> {
            self.record("clear-all".into())
        }
    }

    fn n(id: NotificationId, is_read: bool) -> Notification {
        Notification {
            id,
            kind: NotificationKind::Approval,
            message: "m".into(),
            is_read,
            project_id: Some(100 + id),
            project_title: None,
            comment_id: None,
            comment_text: None,
            commenter_name: None,
            approver_name: None,
            rejection_reason: None,
            created_at: Utc::now(),
        }
    }

    fn feed_with(api: Arc<FakeApi>, policy: WriteFailurePolicy) -> NotificationFeed {
        NotificationFeed::new(api, Some(Session::new("tok", Some("1".into()))), policy)
    }

    fn ids(feed: &NotificationFeed) -> Vec<NotificationId> {
        feed.snapshot().notifications.iter().map(|n| n.id).collect()
    }

    #[tokio::test]
    async fn test_fetch_push_mark_scenario() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = vec![n(1, false), n(2, true)];
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);

        feed.fetch_all().await;
        assert_eq!(feed.unread_count(), 1);

        feed.push(n(3, false));
        assert_eq!(ids(&feed), vec![3, 1, 2]);
        assert_eq!(feed.unread_count(), 2);

        feed.mark_as_read(3).await;
        assert_eq!(feed.unread_count(), 1);
        assert!(feed.snapshot().get(3).unwrap().is_read);
        assert_eq!(api.calls(), vec!["list", "read 3"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_preserves_list() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.push(n(5, false));

        api.fail_reads.store(true, Ordering::SeqCst);
        feed.fetch_all().await;

        let s = feed.snapshot();
        assert_eq!(s.error.as_deref(), Some(FETCH_ERROR_MESSAGE));
        assert!(!s.is_loading);
        assert_eq!(ids(&feed), vec![5]);
        assert_eq!(s.unread_count, 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_feed_never_calls_backend() {
        let api = Arc::new(FakeApi::default());
        let feed = NotificationFeed::new(api.clone(), None, WriteFailurePolicy::Ignore);

        feed.fetch_all().await;
        feed.mark_all_as_read().await;
        feed.clear_all_notifications().await;

        assert!(api.calls().is_empty());
        assert_eq!(feed.snapshot(), FeedSnapshot::default());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_optimistic_state() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.push(n(1, false));
        feed.push(n(2, false));

        api.fail_writes.store(true, Ordering::SeqCst);
        feed.delete_notification(1).await;
        feed.mark_as_read(2).await;

        assert_eq!(ids(&feed), vec![2]);
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(api.calls(), vec!["delete 1", "read 2"]);
    }

    #[tokio::test]
    async fn test_refetch_policy_reconciles_after_failed_write() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = vec![n(1, false), n(2, false)];
        let feed = feed_with(api.clone(), WriteFailurePolicy::Refetch);
        feed.fetch_all().await;

        api.fail_writes.store(true, Ordering::SeqCst);
        feed.delete_notification(1).await;

        // The backend still has entry 1, so the re-fetch restores it.
        assert_eq!(ids(&feed), vec![1, 2]);
        assert_eq!(feed.unread_count(), 2);
        assert_eq!(api.calls(), vec!["list", "delete 1", "list"]);
    }

    #[tokio::test]
    async fn test_mark_all_and_clear() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.push(n(1, false));
        feed.push(n(2, true));
        feed.push(n(3, false));

        feed.mark_all_as_read().await;
        assert_eq!(feed.unread_count(), 0);
        assert!(feed.snapshot().notifications.iter().all(|n| n.is_read));

        feed.clear_all_notifications().await;
        assert!(feed.snapshot().is_empty());
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(api.calls(), vec!["read-all", "clear-all"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_leaves_list() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.push(n(1, false));

        feed.delete_notification(77).await;
        assert_eq!(ids(&feed), vec![1]);
        assert_eq!(feed.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_writes_always_reach_backend() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.push(n(1, false));

        feed.mark_as_read(1).await;
        feed.mark_as_read(1).await;
        feed.mark_as_read(55).await;
        feed.delete_notification(56).await;

        assert_eq!(feed.unread_count(), 0);
        assert_eq!(ids(&feed), vec![1]);
        assert_eq!(api.calls(), vec!["read 1", "read 1", "read 55", "delete 56"]);
    }

    fn gated_api(list: Vec<Notification>) -> (Arc<FakeApi>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        *api.list.lock().unwrap() = list;
        (api, gate)
    }

    async fn wait_for_list_calls(api: &FakeApi, n: usize) {
        while api.calls().iter().filter(|c| *c == "list").count() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fetch_completing_after_close_is_discarded() {
        let (api, gate) = gated_api(vec![n(1, false)]);
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);

        let fetch = tokio::spawn({
            let feed = feed.clone();
            async move { feed.fetch_all().await }
        });
        wait_for_list_calls(&api, 1).await;
        assert!(feed.snapshot().is_loading);

        feed.close();
        gate.notify_waiters();
        fetch.await.unwrap();

        let s = feed.snapshot();
        assert!(s.is_empty());
        assert_eq!(s.unread_count, 0);
        assert!(!s.is_loading);
        assert!(s.error.is_none());
    }

    #[tokio::test]
    async fn test_superseded_fetch_is_discarded() {
        let (api, gate) = gated_api(vec![n(1, false)]);
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);

        let first = tokio::spawn({
            let feed = feed.clone();
            async move { feed.fetch_all().await }
        });
        wait_for_list_calls(&api, 1).await;

        *api.list.lock().unwrap() = vec![n(1, false), n(2, false)];
        let second = tokio::spawn({
            let feed = feed.clone();
            async move { feed.fetch_all().await }
        });
        wait_for_list_calls(&api, 2).await;
        assert!(feed.snapshot().is_loading);

        gate.notify_waiters();
        first.await.unwrap();
        second.await.unwrap();

        // Whichever finishes last, only the newer result is applied.
        assert_eq!(ids(&feed), vec![1, 2]);
        assert_eq!(feed.unread_count(), 2);
        assert!(!feed.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_open_marks_read_and_returns_link() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.push(n(4, false));

        assert_eq!(feed.open(4).await.as_deref(), Some("/projects/104"));
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(feed.open(4).await.as_deref(), Some("/projects/104"));
        assert_eq!(api.calls(), vec!["read 4"], "already-read entry is not re-confirmed");
        assert!(feed.open(999).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_feed_ignores_pushes_and_fetches() {
        let api = Arc::new(FakeApi::default());
        *api.list.lock().unwrap() = vec![n(1, false)];
        let feed = feed_with(api.clone(), WriteFailurePolicy::Ignore);
        feed.close();

        feed.push(n(2, false));
        feed.fetch_all().await;
        assert!(feed.snapshot().is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_consistent_snapshots() {
        let api = Arc::new(FakeApi::default());
        let feed = feed_with(api, WriteFailurePolicy::Ignore);
        let mut rx = feed.subscribe();

        feed.push(n(1, false));
        rx.changed().await.unwrap();
        let s = rx.borrow_and_update().clone();
        assert_eq!(s.unread_count, s.counted_unread());
        assert_eq!(s.unread_count, 1);
    }
}
