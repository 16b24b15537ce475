//! Realtime wire protocol: JSON frames `{type, data, id?}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tether_core::types::{ChannelId, RequestId};

/// Inbound message kinds pushed by the backend.
///
/// Kinds the client does not know are kept as [`MessageKind::Unknown`] so they
/// can still be routed to a handler registered under that name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `server_stats`
    ServerStats,
    /// `console_output`
    ConsoleOutput,
    /// `player_join`
    PlayerJoin,
    /// `player_leave`
    PlayerLeave,
    /// `performance_update`
    PerformanceUpdate,
    /// `module_event`
    ModuleEvent,
    /// `security_alert`
    SecurityAlert,
    /// `notification`
    Notification,
    /// `auth_expired`
    AuthExpired,
    /// `pong`
    Pong,
    /// Any other type tag.
    Unknown(String),
}

impl MessageKind {
    /// Every kind with a fixed tag.
    pub const KNOWN: [Self; 10] = [
        Self::ServerStats,
        Self::ConsoleOutput,
        Self::PlayerJoin,
        Self::PlayerLeave,
        Self::PerformanceUpdate,
        Self::ModuleEvent,
        Self::SecurityAlert,
        Self::Notification,
        Self::AuthExpired,
        Self::Pong,
    ];

    /// Parses a type tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "server_stats" => Self::ServerStats,
            "console_output" => Self::ConsoleOutput,
            "player_join" => Self::PlayerJoin,
            "player_leave" => Self::PlayerLeave,
            "performance_update" => Self::PerformanceUpdate,
            "module_event" => Self::ModuleEvent,
            "security_alert" => Self::SecurityAlert,
            "notification" => Self::Notification,
            "auth_expired" => Self::AuthExpired,
            "pong" => Self::Pong,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the type tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerStats => "server_stats",
            Self::ConsoleOutput => "console_output",
            Self::PlayerJoin => "player_join",
            Self::PlayerLeave => "player_leave",
            Self::PerformanceUpdate => "performance_update",
            Self::ModuleEvent => "module_event",
            Self::SecurityAlert => "security_alert",
            Self::Notification => "notification",
            Self::AuthExpired => "auth_expired",
            Self::Pong => "pong",
            Self::Unknown(tag) => tag,
        }
    }

    /// Returns true for kinds outside the fixed set.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

impl Serialize for MessageKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// A frame sent to the backend.
///
/// Serializes as `{"type": ..., "data"?: ..., "id"?: ..., ...extra}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: String,

    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Correlation id for request/reply messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Top-level fields such as `token` or `channel`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundMessage {
    /// A bare message of the given type.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            id: None,
            extra: Map::new(),
        }
    }

    /// `{"type":"authenticate","token":...}`
    #[must_use]
    pub fn authenticate(token: &str) -> Self {
        Self::new("authenticate").with_field("token", Value::String(token.to_string()))
    }

    /// `{"type":"subscribe","channel":...}`
    #[must_use]
    pub fn subscribe(channel: &ChannelId) -> Self {
        Self::new("subscribe").with_field("channel", Value::String(channel.to_string()))
    }

    /// `{"type":"unsubscribe","channel":...}`
    #[must_use]
    pub fn unsubscribe(channel: &ChannelId) -> Self {
        Self::new("unsubscribe").with_field("channel", Value::String(channel.to_string()))
    }

    /// `{"type":"ping"}`
    #[must_use]
    pub fn ping() -> Self {
        Self::new("ping")
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds a top-level field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Serializes the frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A frame received from the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    /// Type tag; missing tags parse as an empty unknown kind.
    #[serde(rename = "type", default = "missing_kind")]
    pub kind: MessageKind,

    /// Payload.
    #[serde(default)]
    pub data: Value,

    /// Correlation id, a string or a number.
    #[serde(default)]
    pub id: Option<Value>,

    /// Error reported for a request.
    #[serde(default)]
    pub error: Option<Value>,
}

fn missing_kind() -> MessageKind {
    MessageKind::Unknown(String::new())
}

impl InboundMessage {
    /// Parses one frame.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The correlation id as a [`RequestId`], if present and non-empty.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        let raw = match self.id.as_ref()? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        RequestId::new(raw).ok()
    }

    /// The error message, if the frame reports one.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_kind_tags() {
        for kind in MessageKind::KNOWN {
            assert_eq!(MessageKind::from_tag(kind.as_str()), kind);
        }
        assert_eq!(
            MessageKind::from_tag("world_event"),
            MessageKind::Unknown("world_event".to_string())
        );
    }

    #[test]
    fn test_authenticate_frame() {
        let json = OutboundMessage::authenticate("abc").to_json().unwrap();
        assert_eq!(json, r#"{"type":"authenticate","token":"abc"}"#);
    }

    #[test]
    fn test_subscribe_frame() {
        let channel = ChannelId::new("console").unwrap();
        let value = serde_json::to_value(OutboundMessage::subscribe(&channel)).unwrap();
        assert_eq!(value, json!({"type": "subscribe", "channel": "console"}));
    }

    #[test]
    fn test_request_frame_carries_id() {
        let id = RequestId::new("req-1").unwrap();
        let message = OutboundMessage::new("get_players")
            .with_data(json!({"online": true}))
            .with_id(id);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"type": "get_players", "data": {"online": true}, "id": "req-1"})
        );
    }

    #[test]
    fn test_inbound_parse() {
        let message = InboundMessage::parse(
            r#"{"type":"console_output","data":{"level":"info","message":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(message.kind, MessageKind::ConsoleOutput);
        assert_eq!(message.data["message"], "hello");
        assert!(message.request_id().is_none());
    }

    #[test]
    fn test_inbound_numeric_id_and_error() {
        let message =
            InboundMessage::parse(r#"{"type":"reply","id":42,"error":"denied"}"#).unwrap();
        assert_eq!(message.request_id().unwrap().as_str(), "42");
        assert_eq!(message.error_message().as_deref(), Some("denied"));
    }

    #[test]
    fn test_inbound_without_type() {
        let message = InboundMessage::parse(r#"{"data":1}"#).unwrap();
        assert!(message.kind.is_unknown());
    }
}
