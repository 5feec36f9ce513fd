use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::feed::WriteFailurePolicy;
use crate::realtime::RECONNECT_DELAY;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub ws_url: Url,
    pub token: Option<String>,
    /// Identity used for the per-user subscription topic.
    /// Set via CATALOG_USER_ID; without it the channel connects but never subscribes.
    pub user_id: Option<String>,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    /// Retries of transient REST failures. Set via CATALOG_MAX_RETRIES. Default: 2.
    pub max_retries: u32,
    pub write_failure_policy: WriteFailurePolicy,
}

impl Config {
    /// Returns the caller's session, or `None` when no token is configured.
    pub fn session(&self) -> Option<Session> {
        self.token
            .as_ref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Session::new(t.clone(), self.user_id.clone()))
    }

    /// Defaults pointing at a local backend on :8080.
    pub fn local() -> Self {
        Self {
            api_base_url: Url::parse("http://localhost:8080").expect("static url"),
            ws_url: Url::parse("ws://localhost:8080/ws").expect("static url"),
            token: None,
            user_id: None,
            reconnect_delay: RECONNECT_DELAY,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            write_failure_policy: WriteFailurePolicy::Ignore,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::local();

    let api_base_url = match std::env::var("CATALOG_API_URL") {
        Ok(v) => Url::parse(&v).with_context(|| format!("CATALOG_API_URL is not a valid url: {}", v))?,
        Err(_) => defaults.api_base_url,
    };
    let ws_url = match std::env::var("CATALOG_WS_URL") {
        Ok(v) => Url::parse(&v).with_context(|| format!("CATALOG_WS_URL is not a valid url: {}", v))?,
        Err(_) => defaults.ws_url,
    };
    if !matches!(ws_url.scheme(), "ws" | "wss") {
        anyhow::bail!("CATALOG_WS_URL must use ws:// or wss://, got {}", ws_url);
    }

    let refetch = std::env::var("CATALOG_REFETCH_ON_WRITE_FAILURE")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    Ok(Config {
        api_base_url,
        ws_url,
        token: std::env::var("CATALOG_TOKEN").ok(),
        user_id: std::env::var("CATALOG_USER_ID").ok(),
        reconnect_delay: parse_reconnect_delay(
            std::env::var("CATALOG_RECONNECT_DELAY_SECS").ok(),
            defaults.reconnect_delay,
        )?,
        request_timeout: Duration::from_secs(parse_or(
            "CATALOG_REQUEST_TIMEOUT_SECS",
            std::env::var("CATALOG_REQUEST_TIMEOUT_SECS").ok(),
            defaults.request_timeout.as_secs(),
        )?),
        max_retries: parse_or(
            "CATALOG_MAX_RETRIES",
            std::env::var("CATALOG_MAX_RETRIES").ok(),
            defaults.max_retries,
        )?,
        write_failure_policy: if refetch {
            WriteFailurePolicy::Refetch
        } else {
            WriteFailurePolicy::Ignore
        },
    })
}

/// Parse an optional env value, falling back to `default` only when unset.
fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} is not a valid number: {}", name, v)),
        None => Ok(default),
    }
}

/// Whole seconds, at least 1.
fn parse_reconnect_delay(raw: Option<String>, default: Duration) -> anyhow::Result<Duration> {
    let secs: u64 = parse_or("CATALOG_RECONNECT_DELAY_SECS", raw, default.as_secs())?;
    if secs == 0 {
        anyhow::bail!("CATALOG_RECONNECT_DELAY_SECS must be at least 1");
    }
    Ok(Duration::from_secs(secs))
}
