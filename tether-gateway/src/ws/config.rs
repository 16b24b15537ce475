//! WebSocket transport configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path of the realtime endpoint on the backend.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// WebSocket endpoint URL.
    pub url: String,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Application ping interval in milliseconds.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Whether to send pings while the connection is open.
    #[serde(default = "default_auto_ping")]
    pub auto_ping: bool,

    /// Text frame sent as the ping. A protocol-level ping frame is sent when unset.
    #[serde(default = "default_ping_message", skip_serializing_if = "Option::is_none")]
    pub custom_ping_message: Option<String>,

    /// Capacity of the outgoing frame buffer.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_auto_ping() -> bool {
    true
}

#[allow(clippy::unnecessary_wraps)]
fn default_ping_message() -> Option<String> {
    Some(r#"{"type":"ping"}"#.to_string())
}

fn default_send_buffer() -> usize {
    100
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            auto_ping: default_auto_ping(),
            custom_ping_message: default_ping_message(),
            send_buffer: default_send_buffer(),
        }
    }
}

impl WebSocketConfig {
    /// Creates a new builder for `WebSocketConfig`.
    #[must_use]
    pub fn builder() -> WebSocketConfigBuilder {
        WebSocketConfigBuilder::default()
    }

    /// Returns the connection timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the ping interval as a Duration.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

/// Derives the realtime endpoint from the backend base URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; any path on the base URL is
/// replaced by [`WEBSOCKET_PATH`].
///
/// ```
/// use tether_gateway::ws::websocket_url;
///
/// assert_eq!(websocket_url("https://panel.example.com/"), "wss://panel.example.com/api/websocket");
/// assert_eq!(websocket_url("http://127.0.0.1:8080"), "ws://127.0.0.1:8080/api/websocket");
/// ```
#[must_use]
pub fn websocket_url(base_url: &str) -> String {
    let (scheme, rest) = match base_url.split_once("://") {
        Some(("https", rest)) => ("wss", rest),
        Some((_, rest)) => ("ws", rest),
        None => ("ws", base_url),
    };
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{scheme}://{host}{WEBSOCKET_PATH}")
}

/// Builder for `WebSocketConfig`.
#[derive(Debug, Default)]
pub struct WebSocketConfigBuilder {
    url: Option<String>,
    connect_timeout_ms: Option<u64>,
    ping_interval_ms: Option<u64>,
    auto_ping: Option<bool>,
    custom_ping_message: Option<Option<String>>,
    send_buffer: Option<usize>,
}

impl WebSocketConfigBuilder {
    /// Sets the WebSocket URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the URL derived from a backend base URL.
    #[must_use]
    pub fn backend(mut self, base_url: &str) -> Self {
        self.url = Some(websocket_url(base_url));
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the ping interval.
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets whether pings are sent.
    #[must_use]
    pub fn auto_ping(mut self, enabled: bool) -> Self {
        self.auto_ping = Some(enabled);
        self
    }

    /// Sets a custom ping text; `None` sends protocol-level ping frames.
    #[must_use]
    pub fn custom_ping_message(mut self, message: Option<String>) -> Self {
        self.custom_ping_message = Some(message);
        self
    }

    /// Sets the outgoing frame buffer capacity.
    #[must_use]
    pub fn send_buffer(mut self, capacity: usize) -> Self {
        self.send_buffer = Some(capacity);
        self
    }

    /// Builds the `WebSocketConfig`.
    #[must_use]
    pub fn build(self) -> WebSocketConfig {
        WebSocketConfig {
            url: self.url.unwrap_or_default(),
            connect_timeout_ms: self
                .connect_timeout_ms
                .unwrap_or_else(default_connect_timeout_ms),
            ping_interval_ms: self.ping_interval_ms.unwrap_or_else(default_ping_interval_ms),
            auto_ping: self.auto_ping.unwrap_or_else(default_auto_ping),
            custom_ping_message: self
                .custom_ping_message
                .unwrap_or_else(default_ping_message),
            send_buffer: self.send_buffer.unwrap_or_else(default_send_buffer).max(1),
        }
    }
}
