//! Proxy configuration.
//!
//! Extends [`TetherConfig`] with the listener, upstream and shutdown settings
//! of the caching proxy.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::config::{EnvOverride, TetherConfig, Validatable, ValidationContext, Validator};
use tether_telemetry::metrics::MetricsConfig;

/// Proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    /// Shared Tether configuration.
    #[serde(flatten)]
    pub tether: TetherConfig,

    /// Listener and upstream settings.
    #[serde(default)]
    pub server: ProxySettings,

    /// Shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl ProxyConfig {
    /// Creates a new builder for `ProxyConfig`.
    #[must_use]
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.tether.apply_env_overrides();
        self.server.apply_env_overrides("TETHER_SERVER");
        self.shutdown.apply_env_overrides("TETHER_SHUTDOWN");
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.tether
            .validate()
            .map_err(|e| ConfigValidationError::InvalidConfig(e.to_string()))?;

        let mut ctx = ValidationContext::new();
        ctx.enter("server");
        self.server.validate_with_context(&mut ctx);
        ctx.exit();
        ctx.enter("shutdown");
        Validator::new(&mut ctx).positive("timeout_secs", &self.shutdown.timeout_secs);
        ctx.exit();

        ctx.into_result()
            .map_err(|e| ConfigValidationError::InvalidConfig(e.to_string()))
    }

    /// Backend the proxy forwards to: `server.upstream` or `backend.base_url`.
    #[must_use]
    pub fn upstream(&self) -> &str {
        self.server
            .upstream
            .as_deref()
            .unwrap_or(&self.tether.backend.base_url)
    }

    /// Listener address as `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Listener, upstream and background task settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream backend. Defaults to `backend.base_url`.
    #[serde(default)]
    pub upstream: Option<String>,

    /// Bound on one upstream request in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Period of the connectivity probe.
    #[serde(default = "default_connectivity_interval", with = "humantime_serde")]
    pub connectivity_interval: Duration,

    /// Register an analytics sync whenever the upstream goes offline.
    #[serde(default = "default_analytics_sync")]
    pub analytics_sync: bool,

    /// Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connectivity_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_analytics_sync() -> bool {
    true
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: None,
            request_timeout_ms: default_request_timeout_ms(),
            connectivity_interval: default_connectivity_interval(),
            analytics_sync: default_analytics_sync(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl ProxySettings {
    /// Upstream request bound.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate_with_context(&self, ctx: &mut ValidationContext) {
        let mut validator = Validator::new(ctx);
        validator
            .require_non_empty("host", &self.host)
            .positive("port", &self.port)
            .positive("request_timeout_ms", &self.request_timeout_ms)
            .custom(
                "connectivity_interval",
                || !self.connectivity_interval.is_zero(),
                "Must be longer than zero",
            );
        if let Some(upstream) = &self.upstream {
            validator.http_url("upstream", upstream);
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_string(&format!("{prefix}_HOST"), &mut self.host);
        EnvOverride::apply_number(&format!("{prefix}_PORT"), &mut self.port);
        EnvOverride::apply_optional_string(&format!("{prefix}_UPSTREAM"), &mut self.upstream);
        EnvOverride::apply_number(
            &format!("{prefix}_REQUEST_TIMEOUT_MS"),
            &mut self.request_timeout_ms,
        );
        EnvOverride::apply_number(&format!("{prefix}_ANALYTICS_SYNC"), &mut self.analytics_sync);
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Timeout for graceful shutdown in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ShutdownConfig {
    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_number(&format!("{prefix}_TIMEOUT"), &mut self.timeout_secs);
    }
}

/// Builder for `ProxyConfig`.
#[derive(Debug, Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Sets the shared Tether configuration.
    #[must_use]
    pub fn tether(mut self, tether: TetherConfig) -> Self {
        self.config.tether = tether;
        self
    }

    /// Sets the listen address.
    #[must_use]
    pub fn listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.server.host = host.into();
        self.config.server.port = port;
        self
    }

    /// Sets the upstream backend.
    #[must_use]
    pub fn upstream(mut self, upstream: impl Into<String>) -> Self {
        self.config.server.upstream = Some(upstream.into());
        self
    }

    /// Sets the connectivity probe period.
    #[must_use]
    pub fn connectivity_interval(mut self, interval: Duration) -> Self {
        self.config.server.connectivity_interval = interval;
        self
    }

    /// Enables or disables the analytics sync on connectivity loss.
    #[must_use]
    pub fn analytics_sync(mut self, enabled: bool) -> Self {
        self.config.server.analytics_sync = enabled;
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown.timeout_secs = timeout.as_secs();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
