//! Shaping push payloads into notifications.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_core::types::Timestamp;

/// Body used when the payload carries no `message`.
pub const DEFAULT_PUSH_BODY: &str = "Server update";

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Identifier reported back on click.
    pub action: String,
    /// Button label.
    pub title: String,
    /// Button icon.
    pub icon: String,
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    /// Heading.
    pub title: String,
    /// Text.
    pub body: String,
    /// Large icon.
    pub icon: String,
    /// Status bar badge.
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    /// Arrival metadata merged with the payload fields.
    pub data: Map<String, Value>,
    /// Buttons.
    pub actions: Vec<NotificationAction>,
}

impl PushNotification {
    /// Builds the notification for `payload` received at `arrived`.
    ///
    /// An object payload supplies the body through `message` and is merged
    /// into `data`; its fields override the arrival metadata.
    #[must_use]
    pub fn from_payload(title: &str, payload: Option<&Value>, arrived: Timestamp) -> Self {
        let mut data = Map::new();
        data.insert("dateOfArrival".to_string(), Value::from(arrived.as_millis()));
        data.insert("primaryKey".to_string(), Value::from(1));

        let mut body = DEFAULT_PUSH_BODY.to_string();
        if let Some(Value::Object(fields)) = payload {
            if let Some(message) = fields.get("message").and_then(Value::as_str)
                && !message.is_empty()
            {
                body = message.to_string();
            }
            data.extend(fields.clone());
        }

        Self {
            title: title.to_string(),
            body,
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            data,
            actions: vec![
                NotificationAction {
                    action: "explore".to_string(),
                    title: "Open dashboard".to_string(),
                    icon: "/icons/checkmark.png".to_string(),
                },
                NotificationAction {
                    action: "close".to_string(),
                    title: "Close".to_string(),
                    icon: "/icons/xmark.png".to_string(),
                },
            ],
        }
    }
}

/// Page to open when a notification is clicked. `None` means just dismiss.
#[must_use]
pub fn click_target(action: Option<&str>) -> Option<&'static str> {
    match action {
        Some("explore") => Some("/#/dashboard"),
        Some("close") => None,
        _ => Some("/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARRIVED: Timestamp = Timestamp::new_unchecked(1_700_000_000_000);

    #[test]
    fn test_defaults_without_payload() {
        let notification = PushNotification::from_payload("Tether", None, ARRIVED);
        assert_eq!(notification.body, DEFAULT_PUSH_BODY);
        assert_eq!(notification.vibrate, vec![100, 50, 100]);
        assert_eq!(notification.data["dateOfArrival"], 1_700_000_000_000_i64);
        assert_eq!(notification.data["primaryKey"], 1);
        let actions: Vec<_> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["explore", "close"]);
    }

    #[test]
    fn test_payload_message_and_data_merge() {
        let payload = json!({"message": "Player joined", "player": "alex", "primaryKey": 7});
        let notification = PushNotification::from_payload("Tether", Some(&payload), ARRIVED);
        assert_eq!(notification.body, "Player joined");
        assert_eq!(notification.data["player"], "alex");
        assert_eq!(notification.data["primaryKey"], 7);
        assert_eq!(notification.data["dateOfArrival"], 1_700_000_000_000_i64);
    }

    #[test]
    fn test_non_object_payload_is_ignored() {
        let payload = json!("plain text");
        let notification = PushNotification::from_payload("Tether", Some(&payload), ARRIVED);
        assert_eq!(notification.body, DEFAULT_PUSH_BODY);
        assert_eq!(notification.data.len(), 2);
    }

    #[test]
    fn test_click_targets() {
        assert_eq!(click_target(Some("explore")), Some("/#/dashboard"));
        assert_eq!(click_target(Some("close")), None);
        assert_eq!(click_target(None), Some("/"));
    }
}
