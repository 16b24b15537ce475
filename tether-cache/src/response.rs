//! Responses as stored in and served from the cache.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::error::CacheError;
use tether_core::types::Timestamp;

use crate::strategy::Strategy;

/// Header recording when a network-first response was stored, in Unix milliseconds.
pub const CACHED_AT_HEADER: &str = "sw-cached-at";

/// Header the proxy adds to say where a response came from.
pub const SOURCE_HEADER: &str = "x-tether-source";

/// An HTTP response: status, headers and the complete body.
///
/// Entries are immutable once written; updating one means replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheResponse {
    /// Status code.
    pub status: u16,

    /// Header pairs in arrival order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Body bytes, hex encoded when persisted.
    #[serde(default, with = "hex_body")]
    pub body: Bytes,
}

impl CacheResponse {
    /// An empty response with `status`.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A JSON response.
    #[must_use]
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    /// A plain-text response.
    #[must_use]
    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(text.into())
    }

    /// An HTML document.
    #[must_use]
    pub fn html(html: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(html.into())
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any value under the same name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// When the entry was stored, if it carries the cached-at annotation.
    #[must_use]
    pub fn cached_at(&self) -> Option<Timestamp> {
        self.header(CACHED_AT_HEADER)?.parse().ok()
    }

    /// A copy annotated with the cached-at time.
    #[must_use]
    pub fn stamped(&self, at: Timestamp) -> Self {
        self.clone().with_header(CACHED_AT_HEADER, at.to_string())
    }

    /// Decodes the body as JSON.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

mod hex_body {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Fetched from the network.
    Network,
    /// Served from a cache partition.
    Cache,
    /// Produced by the offline handler.
    Offline,
}

impl ResponseSource {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::Offline => "offline",
        }
    }
}

/// The outcome of routing one request. Routing always produces a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    /// The response to return.
    pub response: CacheResponse,
    /// Where it came from.
    pub source: ResponseSource,
    /// Strategy the request was routed through.
    pub strategy: Strategy,
}
