//! Read-only derivations used by views (badge, dropdown, notifications page).

use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use clap::ValueEnum;

use crate::models::{Notification, NotificationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FeedFilter {
    #[default]
    All,
    Unread,
    Comments,
    Approvals,
    Rejections,
}

impl FeedFilter {
    pub fn matches(self, n: &Notification) -> bool {
        match self {
            FeedFilter::All => true,
            FeedFilter::Unread => !n.is_read,
            FeedFilter::Comments => n.kind == NotificationKind::Comment,
            FeedFilter::Approvals => n.kind == NotificationKind::Approval,
            FeedFilter::Rejections => n.kind == NotificationKind::Rejection,
        }
    }

    fn noun(self) -> &'static str {
        match self {
            FeedFilter::All => "",
            FeedFilter::Unread => "unread",
            FeedFilter::Comments => "comments",
            FeedFilter::Approvals => "approvals",
            FeedFilter::Rejections => "rejections",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

/// Filter then sort by `created_at`. Ties keep feed order.
pub fn filter_and_sort(
    notifications: &[Notification],
    filter: FeedFilter,
    order: SortOrder,
) -> Vec<&Notification> {
    let mut out: Vec<&Notification> = notifications.iter().filter(|n| filter.matches(n)).collect();
    match order {
        SortOrder::Newest => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
    out
}

/// First `n` entries in feed order (dropdown preview).
pub fn recent(notifications: &[Notification], n: usize) -> &[Notification] {
    &notifications[..notifications.len().min(n)]
}

pub fn type_label(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Comment => "Comment",
        NotificationKind::Approval => "Approval",
        NotificationKind::Rejection => "Rejection",
        NotificationKind::Other(_) => "Notification",
    }
}

/// "5 minutes ago", "in 2 hours", ...
pub fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    HumanTime::from(created_at - now).to_string()
}

pub fn project_link(n: &Notification) -> Option<String> {
    n.project_id.map(|id| format!("/projects/{}", id))
}

pub fn summary(unread_count: usize) -> String {
    if unread_count > 0 {
        format!("{} unread", unread_count)
    } else {
        "All caught up!".to_string()
    }
}

pub fn empty_message(filter: FeedFilter) -> String {
    match filter {
        FeedFilter::All => "You're all caught up!".to_string(),
        other => format!("No {} notifications.", other.noun()),
    }
}

/// One line per notification for terminal output.
pub fn render_line(n: &Notification, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "{:>6}  {}{:<12} {}",
        n.id,
        if n.is_read { "  " } else { "* " },
        type_label(&n.kind),
        n.message
    );
    if let Some(title) = &n.project_title {
        line.push_str(&format!(" [Project: {}]", title));
    }
    if let Some(text) = &n.comment_text {
        line.push_str(&format!(" \"{}\"", text));
    }
    if let Some(reason) = &n.rejection_reason {
        line.push_str(&format!(" (reason: {})", reason));
    }
    line.push_str(&format!("  {}", relative_time(n.created_at, now)));
    line
}
