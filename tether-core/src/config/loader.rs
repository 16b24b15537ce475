//! Configuration loader supporting YAML, TOML and JSON.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml)
    #[default]
    Yaml,
    /// TOML format (.toml)
    Toml,
    /// JSON format (.json)
    Json,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "yaml" | "yml" => Some(Self::Yaml),
                "toml" => Some(Self::Toml),
                "json" => Some(Self::Json),
                _ => None,
            })
    }
}

/// Configuration loader.
///
/// # Example
///
/// ```rust
/// use tether_core::config::{ConfigFormat, ConfigLoader, TetherConfig};
///
/// let config: TetherConfig = ConfigLoader::new()
///     .load_str("backend:\n  base_url: http://localhost:8080\n", ConfigFormat::Yaml)
///     .unwrap();
/// assert_eq!(config.backend.base_url, "http://localhost:8080");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Creates a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Loads configuration from a file, detecting the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized, the file cannot be
    /// read, or the content cannot be parsed.
    pub fn load_file<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let format = Self::detect(path)?;

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::parse(&content, format, &path.display().to_string())
    }

    /// Loads configuration from a string with the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be parsed.
    pub fn load_str<T>(&self, content: &str, format: ConfigFormat) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        Self::parse(content, format, "<string>")
    }

    /// Serializes a configuration to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize<T>(config: &T, format: ConfigFormat) -> Result<String, ConfigError>
    where
        T: serde::Serialize,
    {
        let invalid = |kind: &str, e: String| ConfigError::InvalidFormat {
            path: "<serialize>".to_string(),
            reason: format!("{kind} serialization error: {e}"),
        };
        match format {
            ConfigFormat::Yaml => {
                serde_yaml::to_string(config).map_err(|e| invalid("YAML", e.to_string()))
            }
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| invalid("TOML", e.to_string()))
            }
            ConfigFormat::Json => {
                serde_json::to_string_pretty(config).map_err(|e| invalid("JSON", e.to_string()))
            }
        }
    }

    /// Saves a configuration to a file, detecting the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized, serialization fails,
    /// or the file cannot be written.
    pub fn save_file<T, P>(config: &T, path: P) -> Result<(), ConfigError>
    where
        T: serde::Serialize,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let content = Self::serialize(config, Self::detect(path)?)?;

        std::fs::write(path, content).map_err(|e| ConfigError::FileWriteError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn detect(path: &Path) -> Result<ConfigFormat, ConfigError> {
        ConfigFormat::from_path(path).ok_or_else(|| ConfigError::InvalidFormat {
            path: path.display().to_string(),
            reason: "Unrecognized file extension. Supported: .yaml, .yml, .toml, .json".to_string(),
        })
    }

    fn parse<T>(content: &str, format: ConfigFormat, origin: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        let invalid = |kind: &str, e: String| ConfigError::InvalidFormat {
            path: origin.to_string(),
            reason: format!("{kind} parse error: {e}"),
        };
        match format {
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| invalid("YAML", e.to_string()))
            }
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| invalid("TOML", e.to_string())),
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| invalid("JSON", e.to_string()))
            }
        }
    }
}
