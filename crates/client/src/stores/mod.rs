//! Global stores for application state.

pub mod notifications;

pub use notifications::{
    clear_notifications, dismiss_notification, push_error, push_notification, Notification,
    NotificationLevel, ToastNotifier, NOTIFICATIONS,
};
