//! CLI command implementations.

pub mod cache;
pub mod session;
pub mod watch;

use anyhow::{Context, Result};
use std::path::Path;
use tether_core::config::{ConfigLoader, TetherConfig, Validatable};

/// Loads the configuration at `path`, falling back to defaults when the file
/// does not exist. Environment overrides apply either way.
///
/// # Errors
///
/// Returns error if the file cannot be parsed or fails validation.
pub fn load_config(path: &str) -> Result<TetherConfig> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        ConfigLoader::new()
            .load_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        TetherConfig::default()
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "backend:\n  base_url: \"panel.example.com\"").unwrap();
        assert!(load_config(file.path().to_str().unwrap()).is_err());
    }
}
