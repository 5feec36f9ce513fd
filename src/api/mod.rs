pub mod client;

use async_trait::async_trait;

use crate::errors::FeedError;
use crate::models::{Notification, NotificationCount, NotificationId};
use crate::session::Session;

pub use client::HttpNotificationApi;

/// Backend boundary for the caller's notifications.
/// Implementations: HttpNotificationApi (REST over reqwest).
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// `GET /api/notifications`
    async fn list(&self, session: &Session) -> Result<Vec<Notification>, FeedError>;

    /// `GET /api/notifications/count`
    async fn count(&self, session: &Session) -> Result<NotificationCount, FeedError>;

    /// `PUT /api/notifications/{id}/read`
    async fn mark_read(&self, session: &Session, id: NotificationId) -> Result<(), FeedError>;

    /// `PUT /api/notifications/read-all`
    async fn mark_all_read(&self, session: &Session) -> Result<(), FeedError>;

    /// `DELETE /api/notifications/{id}`
    async fn delete(&self, session: &Session, id: NotificationId) -> Result<(), FeedError>;

    /// `DELETE /api/notifications/clear-all`
    async fn clear_all(&self, session: &Session) -> Result<(), FeedError>;
}
