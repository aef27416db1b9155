//! User-visible notifications (toasts) raised by background work.

use chrono::{DateTime, Utc};
use dioxus::prelude::*;
use uuid::Uuid;

use crate::table::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

impl NotificationLevel {
    pub fn class_name(self) -> &'static str {
        match self {
            NotificationLevel::Info => "notification info",
            NotificationLevel::Success => "notification success",
            NotificationLevel::Error => "notification error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Pending notifications, oldest first.
pub static NOTIFICATIONS: GlobalSignal<Vec<Notification>> = Signal::global(Vec::new);

/// Queue a notification and return its id.
pub fn push_notification(level: NotificationLevel, message: impl Into<String>) -> Uuid {
    let notification = Notification {
        id: Uuid::new_v4(),
        level,
        message: message.into(),
        created_at: Utc::now(),
    };
    let id = notification.id;
    NOTIFICATIONS.write().push(notification);
    id
}

pub fn push_error(message: impl Into<String>) -> Uuid {
    push_notification(NotificationLevel::Error, message)
}

pub fn dismiss_notification(id: Uuid) {
    NOTIFICATIONS.write().retain(|n| n.id != id);
}

pub fn clear_notifications() {
    NOTIFICATIONS.write().clear();
}

/// Routes table fetch failures into [`NOTIFICATIONS`]. Only usable from
/// inside the Dioxus runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToastNotifier;

impl Notifier for ToastNotifier {
    fn notify_error(&self, message: &str) {
        crate::log_error!("Table fetch failed: {}", message);
        push_error(message);
    }
}
