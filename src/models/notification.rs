use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type NotificationId = i64;

/// Category of a notification. Anything the client does not recognise is
/// kept verbatim in `Other` and rendered as a generic notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Comment,
    Approval,
    Rejection,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Comment => "COMMENT",
            NotificationKind::Approval => "APPROVAL",
            NotificationKind::Rejection => "REJECTION",
            NotificationKind::Other(s) => s,
        }
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        NotificationKind::Other(String::new())
    }
}

impl From<String> for NotificationKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "COMMENT" => NotificationKind::Comment,
            "APPROVAL" => NotificationKind::Approval,
            "REJECTION" => NotificationKind::Rejection,
            _ => NotificationKind::Other(s),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event delivered to a user, as returned by `GET /api/notifications`
/// and carried in `NOTIFICATION` push envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    // The backend entity names this `notificationType`.
    #[serde(rename = "type", alias = "notificationType", default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commenter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /api/notifications/count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCount {
    pub unread_count: u64,
    pub total_count: u64,
}
