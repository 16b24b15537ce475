//! Realtime client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::config::RealtimeSettings;
use tether_core::types::ChannelId;
use tracing::warn;

/// Timing and retry parameters of the realtime client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Heartbeat period in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Bound on one heartbeat probe in milliseconds.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Failures tolerated before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base; attempt `n` waits `2^n * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Request/reply timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Channels subscribed on start.
    #[serde(default)]
    pub channels: Vec<ChannelId>,
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            channels: Vec::new(),
        }
    }
}

impl RealtimeConfig {
    /// Creates a new builder for `RealtimeConfig`.
    #[must_use]
    pub fn builder() -> RealtimeConfigBuilder {
        RealtimeConfigBuilder::default()
    }

    /// Heartbeat period.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat probe bound.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Request/reply timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay before reconnect attempt `attempt`: `2^attempt * base_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl From<&RealtimeSettings> for RealtimeConfig {
    fn from(settings: &RealtimeSettings) -> Self {
        let channels = settings
            .channels
            .iter()
            .filter_map(|name| match ChannelId::new(name.as_str()) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!(channel = %name, error = %e, "Skipping invalid channel");
                    None
                }
            })
            .collect();

        Self {
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
            max_attempts: settings.max_reconnect_attempts,
            base_delay_ms: settings.base_delay_ms,
            request_timeout_ms: settings.request_timeout_ms,
            channels,
        }
    }
}

/// Builder for `RealtimeConfig`.
#[derive(Debug, Default)]
pub struct RealtimeConfigBuilder {
    heartbeat_interval_ms: Option<u64>,
    heartbeat_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    channels: Vec<ChannelId>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RealtimeConfigBuilder {
    /// Sets the heartbeat period.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = Some(millis(interval));
        self
    }

    /// Sets the heartbeat probe bound.
    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout_ms = Some(millis(timeout));
        self
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = Some(millis(delay));
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(millis(timeout));
        self
    }

    /// Adds a channel subscribed on start.
    #[must_use]
    pub fn channel(mut self, channel: ChannelId) -> Self {
        self.channels.push(channel);
        self
    }

    /// Builds the `RealtimeConfig`.
    #[must_use]
    pub fn build(self) -> RealtimeConfig {
        RealtimeConfig {
            heartbeat_interval_ms: self
                .heartbeat_interval_ms
                .unwrap_or_else(default_heartbeat_interval_ms),
            heartbeat_timeout_ms: self
                .heartbeat_timeout_ms
                .unwrap_or_else(default_heartbeat_timeout_ms),
            max_attempts: self.max_attempts.unwrap_or_else(default_max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or_else(default_base_delay_ms),
            request_timeout_ms: self
                .request_timeout_ms
                .unwrap_or_else(default_request_timeout_ms),
            channels: self.channels,
        }
    }
}
