//! Outbound notifications
//!
//! The core emits [`Notification`]s at well-defined points (catches,
//! failsafe trips, reconnect lifecycle, selling, faults). Delivery is
//! fire-and-forget: a failing sink is logged and otherwise ignored.

use serde::Serialize;

use super::PlatformError;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FishCaught,
    FailsafeTriggered,
    ReconnectTriggered,
    ProcessDetected,
    Reconnected,
    ReconnectFailed,
    SellComplete,
    Error,
}

/// A single outbound message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    /// Attach a named field
    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }
}

/// Notification sink (webhook, desktop toast, ...)
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), PlatformError>;
}

/// Deliver a notification, logging instead of propagating failures
pub fn send(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification) {
        log::warn!("Notification {:?} not delivered: {}", notification.kind, e);
    }
}

/// Sink that writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), PlatformError> {
        let fields = notification
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");

        match notification.kind {
            NotificationKind::Error | NotificationKind::ReconnectFailed => log::error!(
                "[{:?}] {}: {} {}",
                notification.kind,
                notification.title,
                notification.description,
                fields
            ),
            _ => log::info!(
                "[{:?}] {}: {} {}",
                notification.kind,
                notification.title,
                notification.description,
                fields
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl Notifier for BrokenSink {
        fn notify(&self, _: &Notification) -> Result<(), PlatformError> {
            Err(PlatformError::Notify("webhook unreachable".into()))
        }
    }

    #[test]
    fn test_builder_fields() {
        let n = Notification::new(NotificationKind::FishCaught, "Caught", "Salmon")
            .field("count", 3)
            .field("label", "Salmon");

        assert_eq!(n.fields.len(), 2);
        assert_eq!(n.fields[0], ("count".to_string(), "3".to_string()));
    }

    #[test]
    fn test_serializes_for_webhooks() {
        let n = Notification::new(NotificationKind::ReconnectTriggered, "Reconnect", "Scheduled");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["kind"], "reconnect_triggered");
        assert_eq!(json["title"], "Reconnect");
    }

    #[test]
    fn test_send_swallows_failures() {
        send(&BrokenSink, Notification::new(NotificationKind::Error, "x", "y"));
        send(&LogNotifier, Notification::new(NotificationKind::Error, "x", "y"));
    }
}
