//! User-visible notifications.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Display options for a notification. Notifications sharing an `id` replace
/// one another instead of stacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOptions {
    pub id: String,
    pub severity: Severity,
}

/// Destination for transient user messages.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, options: NotifyOptions);
}

/// A notification as currently displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub severity: Severity,
}

/// Holds the notifications currently on display, de-duplicated by id.
#[derive(Debug, Default)]
pub struct NotificationBoard {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications in the order their ids first appeared.
    pub fn current(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn dismiss(&self, id: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|n| n.id != id);
    }
}

impl NotificationSink for NotificationBoard {
    fn notify(&self, message: &str, options: NotifyOptions) {
        let notification = Notification {
            id: options.id,
            message: message.to_string(),
            severity: options.severity,
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => *existing = notification,
            None => entries.push(notification),
        }
    }
}

/// Emits notifications as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, message: &str, options: NotifyOptions) {
        match options.severity {
            Severity::Info => tracing::info!(id = %options.id, "{}", message),
            Severity::Warning => tracing::warn!(id = %options.id, "{}", message),
            Severity::Error => tracing::error!(id = %options.id, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(id: &str) -> NotifyOptions {
        NotifyOptions {
            id: id.to_string(),
            severity: Severity::Error,
        }
    }

    #[test]
    fn test_same_id_replaces() {
        let board = NotificationBoard::new();
        board.notify("first", error("sync"));
        board.notify("second", error("sync"));

        let current = board.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].message, "second");
    }

    #[test]
    fn test_different_ids_stack() {
        let board = NotificationBoard::new();
        board.notify("a", error("one"));
        board.notify("b", error("two"));
        assert_eq!(board.current().len(), 2);
    }

    #[test]
    fn test_dismiss() {
        let board = NotificationBoard::new();
        board.notify("a", error("one"));
        board.dismiss("one");
        assert!(board.current().is_empty());
    }
}
