//! Tether system configuration structures.

use super::traits::Validatable;
use super::validation::{EnvOverride, ValidationContext, Validator};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level Tether configuration.
///
/// # Example YAML
///
/// ```yaml
/// backend:
///   base_url: "https://panel.example.com"
///
/// realtime:
///   channels: ["console", "players"]
///   max_reconnect_attempts: 5
///
/// cache:
///   storage_dir: ".tether/cache"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TetherConfig {
    /// Backend endpoint and credential storage.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Heartbeat, reconnect and request timing.
    #[serde(default)]
    pub realtime: RealtimeSettings,

    /// HTTP cache router settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Validatable for TetherConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut ctx = ValidationContext::new();

        ctx.enter("backend");
        self.backend.validate_with_context(&mut ctx);
        ctx.exit();

        ctx.enter("realtime");
        self.realtime.validate_with_context(&mut ctx);
        ctx.exit();

        ctx.enter("cache");
        self.cache.validate_with_context(&mut ctx);
        ctx.exit();

        ctx.enter("logging");
        self.logging.validate_with_context(&mut ctx);
        ctx.exit();

        ctx.into_result()
    }
}

impl TetherConfig {
    /// Applies environment variable overrides to the configuration.
    ///
    /// Variables are prefixed with `TETHER_` followed by the section name:
    ///
    /// - `TETHER_BACKEND_BASE_URL=https://panel` overrides `backend.base_url`
    /// - `TETHER_REALTIME_CHANNELS=console,players` overrides `realtime.channels`
    /// - `TETHER_CACHE_MAX_AGE_MS=3600000` overrides `cache.max_age_ms`
    pub fn apply_env_overrides(&mut self) {
        self.backend.apply_env_overrides("TETHER_BACKEND");
        self.realtime.apply_env_overrides("TETHER_REALTIME");
        self.cache.apply_env_overrides("TETHER_CACHE");
        self.logging.apply_env_overrides("TETHER_LOGGING");
    }
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend REST API. The WebSocket URL is derived from it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the JSON file holding persisted client-side state (session token, theme).
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_credentials_path() -> String {
    ".tether/credentials.json".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl BackendConfig {
    fn validate_with_context(&self, ctx: &mut ValidationContext) {
        Validator::new(ctx)
            .http_url("base_url", &self.base_url)
            .require_non_empty("credentials_path", &self.credentials_path);
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_string(&format!("{prefix}_BASE_URL"), &mut self.base_url);
        EnvOverride::apply_string(
            &format!("{prefix}_CREDENTIALS_PATH"),
            &mut self.credentials_path,
        );
    }
}

/// Realtime client timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// Heartbeat probe period in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Heartbeat probe timeout in milliseconds.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Attempts before the reconnect controller gives up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base backoff delay in milliseconds; attempt `n` waits `2^n * base`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Request/reply timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Application ping period in milliseconds.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Channels subscribed on every (re)connect.
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            channels: Vec::new(),
        }
    }
}

impl RealtimeSettings {
    fn validate_with_context(&self, ctx: &mut ValidationContext) {
        let heartbeat_ok = self.heartbeat_timeout_ms < self.heartbeat_interval_ms;
        Validator::new(ctx)
            .positive("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .positive("heartbeat_timeout_ms", &self.heartbeat_timeout_ms)
            .in_range(
                "max_reconnect_attempts",
                &self.max_reconnect_attempts,
                &1,
                &20,
            )
            .positive("base_delay_ms", &self.base_delay_ms)
            .positive("request_timeout_ms", &self.request_timeout_ms)
            .positive("ping_interval_ms", &self.ping_interval_ms)
            .custom(
                "heartbeat_timeout_ms",
                || heartbeat_ok,
                "Must be shorter than heartbeat_interval_ms",
            );
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_number(
            &format!("{prefix}_HEARTBEAT_INTERVAL_MS"),
            &mut self.heartbeat_interval_ms,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_HEARTBEAT_TIMEOUT_MS"),
            &mut self.heartbeat_timeout_ms,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_MAX_RECONNECT_ATTEMPTS"),
            &mut self.max_reconnect_attempts,
        );
        EnvOverride::apply_number(&format!("{prefix}_BASE_DELAY_MS"), &mut self.base_delay_ms);
        EnvOverride::apply_number(
            &format!("{prefix}_REQUEST_TIMEOUT_MS"),
            &mut self.request_timeout_ms,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_PING_INTERVAL_MS"),
            &mut self.ping_interval_ms,
        );
        EnvOverride::apply_list(&format!("{prefix}_CHANNELS"), &mut self.channels);
    }

    /// Returns the heartbeat period as a Duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Returns the heartbeat probe timeout as a Duration.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the ping period as a Duration.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

/// HTTP cache router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory holding the durable cache partitions.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Version suffix of the partition names; bumping it makes activation drop old partitions.
    #[serde(default = "default_cache_version")]
    pub version: String,

    /// Expiry sweep period in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Maximum age of API partition entries in milliseconds.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,

    /// URLs fetched into the static partition on install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,
}

fn default_storage_dir() -> String {
    ".tether/cache".to_string()
}

fn default_cache_version() -> String {
    "v1".to_string()
}

fn default_sweep_interval_ms() -> u64 {
    3_600_000
}

fn default_max_age_ms() -> u64 {
    86_400_000
}

fn default_precache_urls() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/css/main.css", "/js/app.js"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            version: default_cache_version(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_age_ms: default_max_age_ms(),
            precache_urls: default_precache_urls(),
        }
    }
}

impl CacheSettings {
    fn validate_with_context(&self, ctx: &mut ValidationContext) {
        Validator::new(ctx)
            .require_non_empty("storage_dir", &self.storage_dir)
            .require_non_empty("version", &self.version)
            .positive("sweep_interval_ms", &self.sweep_interval_ms)
            .positive("max_age_ms", &self.max_age_ms);
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_string(&format!("{prefix}_STORAGE_DIR"), &mut self.storage_dir);
        EnvOverride::apply_string(&format!("{prefix}_VERSION"), &mut self.version);
        EnvOverride::apply_number(
            &format!("{prefix}_SWEEP_INTERVAL_MS"),
            &mut self.sweep_interval_ms,
        );
        EnvOverride::apply_number(&format!("{prefix}_MAX_AGE_MS"), &mut self.max_age_ms);
        EnvOverride::apply_list(&format!("{prefix}_PRECACHE_URLS"), &mut self.precache_urls);
    }

    /// Returns the sweep period as a Duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Returns the maximum API entry age as a Duration.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    fn validate_with_context(&self, ctx: &mut ValidationContext) {
        let level_ok = matches!(
            self.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        );
        let format_ok = matches!(self.format.as_str(), "json" | "pretty");
        Validator::new(ctx)
            .custom("level", || level_ok, "Must be one of trace, debug, info, warn, error")
            .custom("format", || format_ok, "Must be json or pretty");
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_string(&format!("{prefix}_LEVEL"), &mut self.level);
        EnvOverride::apply_string(&format!("{prefix}_FORMAT"), &mut self.format);
        EnvOverride::apply_optional_string(&format!("{prefix}_DIRECTORY"), &mut self.directory);
    }
}
