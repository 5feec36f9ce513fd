//! Real-time notification channel.
//!
//! One background task owns the WebSocket. It:
//!   1. Connects with the caller's bearer token on the upgrade request
//!   2. Subscribes to `/topic/notifications/{userId}`
//!   3. Routes `NOTIFICATION` deliveries into the feed
//!   4. On close or error, waits `reconnect_delay` and starts over
//!
//! The loop never gives up; it only ends when the manager is shut down or dropped.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::errors::FeedError;
use crate::feed::NotificationFeed;
use crate::models::envelope::{ClientMessage, ServerMessage};
use crate::session::Session;

/// Fixed pause between a lost channel and the next connect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Handle to the background channel task.
pub struct ConnectionManager {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn spawn(
        ws_url: Url,
        session: Session,
        feed: NotificationFeed,
        reconnect_delay: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            ws_url,
            session,
            feed,
            reconnect_delay,
            state: state_tx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the current channel, cancel any pending reconnect and wait for the task to end.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "realtime task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

struct Worker {
    ws_url: Url,
    session: Session,
    feed: NotificationFeed,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

/// Resolves once shutdown is requested or the manager is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

impl Worker {
    async fn run(mut self) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            self.transition(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = stopped(&mut self.shutdown) => break,
                res = connect(&self.ws_url, &self.session) => res,
            };

            match connected {
                Ok(ws) => {
                    tracing::info!(url = %self.ws_url, attempt, "realtime: channel open");
                    self.transition(ConnectionState::Connected);
                    let shutdown_requested = self.pump(ws).await;
                    self.transition(ConnectionState::Disconnected);
                    if shutdown_requested {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.ws_url, attempt, error = %e, "realtime: connect failed");
                    self.transition(ConnectionState::Disconnected);
                }
            }

            tracing::debug!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "realtime: scheduling reconnect"
            );
            tokio::select! {
                _ = stopped(&mut self.shutdown) => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.transition(ConnectionState::Disconnected);
        tracing::info!(attempts = attempt, "realtime: manager stopped");
    }

    fn transition(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|s| {
            if *s == next {
                return false;
            }
            *s = next;
            true
        });
        if changed {
            tracing::debug!(state = %next, "realtime: state changed");
        }
        self.feed.set_connected(next == ConnectionState::Connected);
    }

    /// Drive one open channel. Returns true if it ended because of shutdown.
    async fn pump(&mut self, ws: WsStream) -> bool {
        let (mut sink, mut stream) = ws.split();

        match self.session.user_id() {
            Some(user_id) => {
                let subscribe = ClientMessage::subscribe(user_id);
                let text = match serde_json::to_string(&subscribe) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(error = %e, "realtime: failed to encode subscribe message");
                        return false;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "realtime: subscribe send failed");
                    return false;
                }
                tracing::debug!(user_id, "realtime: subscribe sent");
            }
            None => {
                tracing::warn!("realtime: no user id in session, channel open without subscription");
            }
        }

        let mut received: u64 = 0;
        let shutdown_requested = loop {
            tokio::select! {
                _ = stopped(&mut self.shutdown) => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break true;
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        received += 1;
                        dispatch(&text, &self.feed);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        received += 1;
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => dispatch(text, &self.feed),
                            Err(e) => tracing::warn!(error = %e, "realtime: dropping non-utf8 frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "realtime: channel closed by server");
                        // flush the queued close reply
                        let _ = sink.close().await;
                        break false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "realtime: transport error");
                        break false;
                    }
                    None => {
                        tracing::info!("realtime: channel ended");
                        break false;
                    }
                },
            }
        };

        tracing::debug!(received, "realtime: channel session finished");
        shutdown_requested
    }
}

async fn connect(ws_url: &Url, session: &Session) -> Result<WsStream, FeedError> {
    let mut request = ws_url.as_str().into_client_request()?;
    let bearer = HeaderValue::from_str(&session.bearer())
        .map_err(|e| tokio_tungstenite::tungstenite::Error::HttpFormat(e.into()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (ws, _resp) = connect_async(request).await?;
    Ok(ws)
}

/// Route one inbound text frame. Malformed frames are dropped.
fn dispatch(text: &str, feed: &NotificationFeed) {
    match ServerMessage::parse(text) {
        Ok(ServerMessage::Notification { payload }) => feed.push(payload),
        Ok(ServerMessage::Subscribed { message }) => {
            tracing::info!(%message, "realtime: subscription acknowledged");
        }
        Ok(ServerMessage::Unknown) => {
            tracing::debug!("realtime: ignoring message of unknown type");
        }
        Err(e) => {
            tracing::warn!(error = %e, "realtime: dropping malformed message");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
