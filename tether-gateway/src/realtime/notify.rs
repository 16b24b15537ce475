//! User-visible notifications raised by the realtime layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Link status shown in the dashboard header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Session open.
    Connected,
    /// Reconnect in progress.
    Connecting,
    /// No session.
    Disconnected,
}

/// How a notification is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Dismissible toast.
    Toast,
    /// Blocking error state that requires a manual reload.
    Blocking,
    /// Forced return to the login screen.
    ForceLogin,
    /// Status indicator only.
    Status,
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Informational.
    Info,
    /// Something recovered.
    Success,
    /// Transient problem.
    Warning,
    /// Terminal problem.
    Error,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A failure was detected; reconnect attempt `attempt` of `max` is scheduled.
    ConnectionProblem {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Maximum attempts.
        max: u32,
    },
    /// The connection recovered.
    ConnectionRestored,
    /// Reconnecting was given up.
    ConnectionLost,
    /// The session credential is no longer valid.
    SessionExpired,
    /// The link status changed.
    StatusChanged {
        /// New status.
        status: LinkStatus,
    },
}

impl Notification {
    /// How the notification is presented.
    #[must_use]
    pub fn presentation(&self) -> Presentation {
        match self {
            Self::ConnectionProblem { .. } | Self::ConnectionRestored => Presentation::Toast,
            Self::ConnectionLost => Presentation::Blocking,
            Self::SessionExpired => Presentation::ForceLogin,
            Self::StatusChanged { .. } => Presentation::Status,
        }
    }

    /// Severity.
    #[must_use]
    pub fn level(&self) -> NotificationLevel {
        match self {
            Self::ConnectionProblem { .. } | Self::SessionExpired => NotificationLevel::Warning,
            Self::ConnectionRestored => NotificationLevel::Success,
            Self::ConnectionLost => NotificationLevel::Error,
            Self::StatusChanged { .. } => NotificationLevel::Info,
        }
    }

    /// Text shown to the user.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ConnectionProblem { attempt, max } => {
                format!("Connection problem detected (attempt {attempt}/{max})")
            }
            Self::ConnectionRestored => "Connection restored".to_string(),
            Self::ConnectionLost => {
                "Connection lost. The connection to the server could not be restored.".to_string()
            }
            Self::SessionExpired => "Session expired. Please log in again.".to_string(),
            Self::StatusChanged { status } => match status {
                LinkStatus::Connected => "Connected".to_string(),
                LinkStatus::Connecting => "Connecting".to_string(),
                LinkStatus::Disconnected => "Disconnected".to_string(),
            },
        }
    }

    /// Returns true if the user must act before the dashboard is usable again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.presentation(),
            Presentation::Blocking | Presentation::ForceLogin
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    /// Presents one notification. Must not block.
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let presentation = notification.presentation();
        match notification.level() {
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(?presentation, "{}", notification.message());
            }
            NotificationLevel::Warning => warn!(?presentation, "{}", notification.message()),
            NotificationLevel::Error => error!(?presentation, "{}", notification.message()),
        }
    }
}

/// Fans notifications out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` notifications per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.tx.send(notification);
    }
}

/// Forwards every notification to each inner notifier.
#[derive(Default, Clone)]
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl CompositeNotifier {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a notifier.
    #[must_use]
    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }
}

impl Notifier for CompositeNotifier {
    fn notify(&self, notification: Notification) {
        for notifier in &self.notifiers {
            notifier.notify(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation() {
        assert_eq!(
            Notification::ConnectionProblem { attempt: 1, max: 5 }.presentation(),
            Presentation::Toast
        );
        assert_eq!(Notification::ConnectionLost.presentation(), Presentation::Blocking);
        assert_eq!(
            Notification::SessionExpired.presentation(),
            Presentation::ForceLogin
        );
        assert!(Notification::ConnectionLost.is_terminal());
        assert!(!Notification::ConnectionRestored.is_terminal());
    }

    #[test]
    fn test_problem_message() {
        let notification = Notification::ConnectionProblem { attempt: 2, max: 5 };
        assert_eq!(
            notification.to_string(),
            "Connection problem detected (attempt 2/5)"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(Notification::StatusChanged {
            status: LinkStatus::Connected,
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"kind": "status_changed", "status": "connected"})
        );
    }

    #[tokio::test]
    async fn test_broadcast_and_composite() {
        let broadcast = BroadcastNotifier::new(8);
        let mut rx = broadcast.subscribe();
        let composite = CompositeNotifier::new()
            .with(Arc::new(LogNotifier))
            .with(Arc::new(broadcast.clone()));

        composite.notify(Notification::ConnectionRestored);

        assert_eq!(rx.recv().await.unwrap(), Notification::ConnectionRestored);
    }
}
