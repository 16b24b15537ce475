//! Cache worker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::config::CacheSettings;

use crate::strategy::Partition;

/// Settings of the cache worker and its expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory of the file-backed partitions.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Prefix of every partition name.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Partition name suffix.
    #[serde(default = "default_version")]
    pub version: String,

    /// Expiry sweep period in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Maximum age of API entries in milliseconds.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,

    /// URLs fetched into the static partition on install.
    #[serde(default)]
    pub precache_urls: Vec<String>,
}

fn default_storage_dir() -> String {
    ".tether/cache".to_string()
}

fn default_app_name() -> String {
    "tether".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_sweep_interval_ms() -> u64 {
    3_600_000
}

fn default_max_age_ms() -> u64 {
    86_400_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            storage_dir: settings.storage_dir.clone(),
            app_name: default_app_name(),
            version: settings.version.clone(),
            sweep_interval_ms: settings.sweep_interval_ms,
            max_age_ms: settings.max_age_ms,
            precache_urls: settings.precache_urls.clone(),
        }
    }
}

impl CacheConfig {
    /// Creates a new builder for `CacheConfig`.
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Expiry sweep period.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Maximum API entry age.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Versioned partition names.
    #[must_use]
    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames {
            app_name: self.app_name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Builder for `CacheConfig`.
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    storage_dir: Option<String>,
    app_name: Option<String>,
    version: Option<String>,
    sweep_interval_ms: Option<u64>,
    max_age_ms: Option<u64>,
    precache_urls: Option<Vec<String>>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl CacheConfigBuilder {
    /// Sets the storage directory.
    #[must_use]
    pub fn storage_dir(mut self, dir: impl Into<String>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Sets the partition name prefix.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Sets the partition version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the sweep period.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = Some(millis(interval));
        self
    }

    /// Sets the maximum API entry age.
    #[must_use]
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age_ms = Some(millis(age));
        self
    }

    /// Sets the pre-cache list.
    #[must_use]
    pub fn precache_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_urls = Some(urls.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the config, filling unset fields with defaults.
    #[must_use]
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();
        CacheConfig {
            storage_dir: self.storage_dir.unwrap_or(defaults.storage_dir),
            app_name: self.app_name.unwrap_or(defaults.app_name),
            version: self.version.unwrap_or(defaults.version),
            sweep_interval_ms: self.sweep_interval_ms.unwrap_or(defaults.sweep_interval_ms),
            max_age_ms: self.max_age_ms.unwrap_or(defaults.max_age_ms),
            precache_urls: self.precache_urls.unwrap_or(defaults.precache_urls),
        }
    }
}

/// Maps [`Partition`]s to their versioned storage names, e.g. `tether-api-v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    app_name: String,
    version: String,
}

impl PartitionNames {
    /// Storage name of `partition`.
    #[must_use]
    pub fn name(&self, partition: Partition) -> String {
        format!("{}-{}-{}", self.app_name, partition.as_str(), self.version)
    }

    /// Names of all three partitions.
    #[must_use]
    pub fn known(&self) -> Vec<String> {
        Partition::ALL.iter().map(|p| self.name(*p)).collect()
    }

    /// Returns true if `name` is one of the current partitions.
    #[must_use]
    pub fn is_known(&self, name: &str) -> bool {
        Partition::ALL.iter().any(|p| self.name(*p) == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_settings() {
        let config = CacheConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.max_age(), Duration::from_secs(86_400));
        assert!(config.precache_urls.contains(&"/css/main.css".to_string()));
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::builder()
            .version("v2")
            .max_age(Duration::from_secs(60))
            .precache_urls(["/"])
            .build();
        assert_eq!(config.version, "v2");
        assert_eq!(config.max_age_ms, 60_000);
        assert_eq!(config.precache_urls, vec!["/".to_string()]);
        assert_eq!(config.app_name, "tether");
    }

    #[test]
    fn test_partition_names() {
        let names = CacheConfig::default().partition_names();
        assert_eq!(names.name(Partition::AppShell), "tether-app-shell-v1");
        assert_eq!(names.known().len(), 3);
        assert!(names.is_known("tether-static-v1"));
        assert!(!names.is_known("tether-static-v0"));
    }
}
