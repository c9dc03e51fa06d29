//! Notification types delivered to the presentation layer.
//!
//! The store never talks to a GUI directly. Everything the presentation layer
//! needs to react to is a [`Notification`] handed to a [`NotificationSink`].
//! Notifications serialize to flat JSON objects tagged by `event`:
//!
//! ```json
//! {"event":"content-changed","path":"/home/user/.todos/todos.json","timestamp":"2024-01-15T14:30:00Z"}
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum NotificationKind {
    /// The file at `path` changed and should be reloaded.
    ContentChanged { path: PathBuf },

    /// The active path moved from `from` to `to`.
    PathSwitched { from: PathBuf, to: PathBuf },

    /// The active path is no longer watched; external edits to it will go
    /// unnoticed until the next successful switch.
    WatchLost { path: PathBuf, reason: String },
}

/// A signal from the store to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub kind: NotificationKind,

    /// When the store produced the notification.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification stamped with the current time.
    #[must_use]
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a [`NotificationKind::ContentChanged`] notification.
    #[must_use]
    pub fn content_changed(path: impl Into<PathBuf>) -> Self {
        Self::new(NotificationKind::ContentChanged { path: path.into() })
    }

    /// Returns the event name used on the wire (`content-changed`, ...).
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self.kind {
            NotificationKind::ContentChanged { .. } => "content-changed",
            NotificationKind::PathSwitched { .. } => "path-switched",
            NotificationKind::WatchLost { .. } => "watch-lost",
        }
    }
}

/// Receiver of store notifications.
///
/// `emit` is called from the watcher's background task as well as from the
/// thread running a switch, so implementations must not block.
pub trait NotificationSink: Send + Sync + 'static {
    fn emit(&self, notification: Notification);
}

impl NotificationSink for mpsc::Sender<Notification> {
    fn emit(&self, notification: Notification) {
        // A slow consumer loses notifications rather than stalling the watcher
        if let Err(e) = self.try_send(notification) {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn emit(&self, notification: Notification) {
        if let Err(e) = self.send(notification) {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_changed_serializes_flat() {
        let notification = Notification::content_changed("/home/user/.todos/todos.json");
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["event"], "content-changed");
        assert_eq!(json["path"], "/home/user/.todos/todos.json");
        assert!(json.get("timestamp").is_some());
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn path_switched_serialization() {
        let notification = Notification::new(NotificationKind::PathSwitched {
            from: PathBuf::from("/a/todos.json"),
            to: PathBuf::from("/b/export.json"),
        });
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["event"], "path-switched");
        assert_eq!(json["from"], "/a/todos.json");
        assert_eq!(json["to"], "/b/export.json");
    }

    #[test]
    fn deserializes_from_wire_format() {
        let json = r#"{"event":"watch-lost","path":"/gone.json","reason":"No path was found.","timestamp":"2024-01-15T14:30:00Z"}"#;
        let notification: Notification = serde_json::from_str(json).unwrap();

        assert_eq!(
            notification.kind,
            NotificationKind::WatchLost {
                path: PathBuf::from("/gone.json"),
                reason: "No path was found.".to_string(),
            }
        );
        assert_eq!(notification.event_name(), "watch-lost");
    }

    #[test]
    fn event_names() {
        assert_eq!(
            Notification::content_changed("/x").event_name(),
            "content-changed"
        );
        let switched = Notification::new(NotificationKind::PathSwitched {
            from: PathBuf::from("/a"),
            to: PathBuf::from("/b"),
        });
        assert_eq!(switched.event_name(), "path-switched");
    }

    #[tokio::test]
    async fn bounded_sender_sink_delivers() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.emit(Notification::content_changed("/x"));

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received.kind,
            NotificationKind::ContentChanged {
                path: PathBuf::from("/x")
            }
        );
    }

    #[test]
    fn bounded_sender_sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.emit(Notification::content_changed("/first"));
        tx.emit(Notification::content_changed("/second"));

        let first = rx.try_recv().unwrap();
        assert_eq!(
            first.kind,
            NotificationKind::ContentChanged {
                path: PathBuf::from("/first")
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_sink_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(Notification::content_changed("/x"));
    }
}
