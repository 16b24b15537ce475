//! Channel identifier for realtime subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Name of a realtime channel the client asked the backend to stream
/// (for example `console`, `players` or `performance`).
///
/// # Examples
///
/// ```
/// use tether_core::types::ChannelId;
///
/// let channel = ChannelId::new("console").unwrap();
/// assert_eq!(channel.as_str(), "console");
/// assert!(ChannelId::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a new `ChannelId`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyChannel` for an empty name and
    /// `ValidationError::InvalidChannel` if the name contains whitespace or
    /// control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.is_empty() {
            return Err(ValidationError::EmptyChannel);
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidChannel(s));
        }
        Ok(Self(s))
    }

    /// Returns the channel name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelId> for String {
    fn from(channel: ChannelId) -> Self {
        channel.0
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_rejects_whitespace() {
        assert!(matches!(
            ChannelId::new("con sole"),
            Err(ValidationError::InvalidChannel(_))
        ));
        assert!(matches!(ChannelId::new(""), Err(ValidationError::EmptyChannel)));
    }

    #[test]
    fn test_channel_deserialize_validates() {
        let ok: ChannelId = serde_json::from_str("\"players\"").unwrap();
        assert_eq!(ok.as_str(), "players");

        let bad: Result<ChannelId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
