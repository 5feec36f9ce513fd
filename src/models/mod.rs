pub mod envelope;
pub mod notification;

pub use notification::{Notification, NotificationCount, NotificationId, NotificationKind};
