//! Mounted notification service: one feed plus, when authenticated, one
//! real-time channel feeding it.

use std::sync::Arc;

use crate::api::{HttpNotificationApi, NotificationApi};
use crate::config::Config;
use crate::errors::FeedError;
use crate::feed::NotificationFeed;
use crate::realtime::{ConnectionManager, ConnectionState};

pub struct NotificationService {
    feed: NotificationFeed,
    connection: Option<ConnectionManager>,
}

impl NotificationService {
    /// Build the REST client from config and mount.
    pub async fn start(config: &Config) -> Result<Self, FeedError> {
        let api = HttpNotificationApi::new(
            config.api_base_url.clone(),
            config.request_timeout,
            config.max_retries,
        )?;
        Ok(Self::mount(config, Arc::new(api)).await)
    }

    /// Initial fetch, then open the channel. Without a session neither happens.
    pub async fn mount(config: &Config, api: Arc<dyn NotificationApi>) -> Self {
        let session = config.session();
        let feed = NotificationFeed::new(api, session.clone(), config.write_failure_policy);

        let Some(session) = session else {
            tracing::info!("not authenticated; notification feed idle");
            return Self {
                feed,
                connection: None,
            };
        };

        feed.fetch_all().await;
        let connection = ConnectionManager::spawn(
            config.ws_url.clone(),
            session,
            feed.clone(),
            config.reconnect_delay,
        );

        Self {
            feed,
            connection: Some(connection),
        }
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(ConnectionManager::state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub async fn shutdown(self) {
        if let Some(connection) = self.connection {
            connection.shutdown().await;
        }
        self.feed.close();
        tracing::info!("notification service stopped");
    }
}
