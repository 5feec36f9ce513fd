use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_notify::api::{HttpNotificationApi, NotificationApi};
use catalog_notify::config::{self, Config};
use catalog_notify::feed::{view, NotificationFeed};
use catalog_notify::service::NotificationService;
use catalog_notify::session::Session;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "catalog_notify=info".into()),
    );
    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cfg = config::load()?;

    match args.command.unwrap_or(cli::Commands::Watch) {
        cli::Commands::Watch => run_watch(&cfg).await,
        cli::Commands::List { filter, sort, limit } => run_list(&cfg, filter, sort, limit).await,
        cli::Commands::Open { id } => run_open(&cfg, id).await,
        cli::Commands::Count => {
            let (session, api) = (require_session(&cfg)?, http_api(&cfg)?);
            let count = api.count(&session).await.context("failed to fetch notification count")?;
            println!("{} unread / {} total", count.unread_count, count.total_count);
            Ok(())
        }
        cli::Commands::Read { id } => {
            let (session, api) = (require_session(&cfg)?, http_api(&cfg)?);
            api.mark_read(&session, id)
                .await
                .with_context(|| format!("failed to mark notification {} as read", id))?;
            println!("notification {} marked as read", id);
            Ok(())
        }
        cli::Commands::ReadAll => {
            let (session, api) = (require_session(&cfg)?, http_api(&cfg)?);
            api.mark_all_read(&session)
                .await
                .context("failed to mark all notifications as read")?;
            println!("all notifications marked as read");
            Ok(())
        }
        cli::Commands::Delete { id } => {
            let (session, api) = (require_session(&cfg)?, http_api(&cfg)?);
            api.delete(&session, id)
                .await
                .with_context(|| format!("failed to delete notification {}", id))?;
            println!("notification {} deleted", id);
            Ok(())
        }
        cli::Commands::Clear => {
            let (session, api) = (require_session(&cfg)?, http_api(&cfg)?);
            api.clear_all(&session).await.context("failed to clear notifications")?;
            println!("all notifications cleared");
            Ok(())
        }
    }
}

fn require_session(cfg: &Config) -> anyhow::Result<Session> {
    cfg.session()
        .context("CATALOG_TOKEN is not set; log in and export the bearer token first")
}

fn http_api(cfg: &Config) -> anyhow::Result<HttpNotificationApi> {
    HttpNotificationApi::new(cfg.api_base_url.clone(), cfg.request_timeout, cfg.max_retries)
        .context("failed to build HTTP client")
}

/// A feed without a live channel, loaded once.
async fn loaded_feed(cfg: &Config) -> anyhow::Result<NotificationFeed> {
    let session = require_session(cfg)?;
    let feed = NotificationFeed::new(Arc::new(http_api(cfg)?), Some(session), cfg.write_failure_policy);
    feed.fetch_all().await;
    if let Some(err) = feed.snapshot().error {
        anyhow::bail!(err);
    }
    Ok(feed)
}

async fn run_list(
    cfg: &Config,
    filter: view::FeedFilter,
    sort: view::SortOrder,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let feed = loaded_feed(cfg).await?;
    let snapshot = feed.snapshot();
    let now = chrono::Utc::now();

    println!("Notifications: {}", view::summary(snapshot.unread_count));
    let entries = view::filter_and_sort(&snapshot.notifications, filter, sort);
    if entries.is_empty() {
        println!("{}", view::empty_message(filter));
        return Ok(());
    }
    for n in entries.into_iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{}", view::render_line(n, now));
    }
    Ok(())
}

async fn run_open(cfg: &Config, id: i64) -> anyhow::Result<()> {
    let feed = loaded_feed(cfg).await?;
    if feed.snapshot().get(id).is_none() {
        anyhow::bail!("notification {} not found", id);
    }
    match feed.open(id).await {
        Some(link) => println!("{}", link),
        None => println!("notification {} is not linked to a project", id),
    }
    Ok(())
}

async fn run_watch(cfg: &Config) -> anyhow::Result<()> {
    require_session(cfg)?;
    let service = NotificationService::start(cfg)
        .await
        .context("failed to start notification service")?;
    let feed = service.feed().clone();
    let mut updates = feed.subscribe();

    let initial = feed.snapshot();
    if let Some(err) = &initial.error {
        tracing::warn!(error = %err, "initial fetch failed; waiting for live notifications");
    }
    let now = chrono::Utc::now();
    println!("{}", view::summary(initial.unread_count));
    for n in view::recent(&initial.notifications, 10) {
        println!("{}", view::render_line(n, now));
    }

    let mut seen: HashSet<i64> = initial.notifications.iter().map(|n| n.id).collect();
    let mut unread = initial.unread_count;
    let mut connected = initial.is_connected;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                let now = chrono::Utc::now();
                for n in snapshot.notifications.iter().filter(|n| !seen.contains(&n.id)) {
                    println!("{}", view::render_line(n, now));
                }
                seen = snapshot.notifications.iter().map(|n| n.id).collect();
                if snapshot.unread_count != unread {
                    unread = snapshot.unread_count;
                    println!("{}", view::summary(unread));
                }
                if snapshot.is_connected != connected {
                    connected = snapshot.is_connected;
                    tracing::info!(connected, "live channel status changed");
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
