//! HTTP client for the backend's `/api/notifications` resource.
//! Uses reqwest-middleware for retries of transient failures.

use async_trait::async_trait;
use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::NotificationApi;
use crate::errors::FeedError;
use crate::models::{Notification, NotificationCount, NotificationId};
use crate::session::Session;

pub struct HttpNotificationApi {
    base_url: Url,
    client: ClientWithMiddleware,
}

impl HttpNotificationApi {
    pub fn new(base_url: Url, timeout: Duration, max_retries: u32) -> Result<Self, FeedError> {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("catalog-notify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FeedError> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a request and return the raw body of a 2xx response.
    async fn send(&self, session: &Session, method: Method, path: &str) -> Result<String, FeedError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%method, %url, "notification api request");

        let resp = self
            .client
            .request(method.clone(), url.clone())
            .header(reqwest::header::AUTHORIZATION, session.bearer())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::warn!(%method, %url, %status, "notification api returned error status");
            return Err(FeedError::Status { status, body });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        method: Method,
        path: &str,
    ) -> Result<T, FeedError> {
        let body = self.send(session, method, path).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, session: &Session) -> Result<Vec<Notification>, FeedError> {
        self.send_json(session, Method::GET, "/api/notifications").await
    }

    async fn count(&self, session: &Session) -> Result<NotificationCount, FeedError> {
        self.send_json(session, Method::GET, "/api/notifications/count").await
    }

    async fn mark_read(&self, session: &Session, id: NotificationId) -> Result<(), FeedError> {
        self.send(session, Method::PUT, &format!("/api/notifications/{}/read", id))
            .await
            .map(drop)
    }

    async fn mark_all_read(&self, session: &Session) -> Result<(), FeedError> {
        self.send(session, Method::PUT, "/api/notifications/read-all")
            .await
            .map(drop)
    }

    async fn delete(&self, session: &Session, id: NotificationId) -> Result<(), FeedError> {
        self.send(session, Method::DELETE, &format!("/api/notifications/{}", id))
            .await
            .map(drop)
    }

    async fn clear_all(&self, session: &Session) -> Result<(), FeedError> {
        self.send(session, Method::DELETE, "/api/notifications/clear-all")
            .await
            .map(drop)
    }
}

// ── Tests ──────────────────────────────────────────────────────
