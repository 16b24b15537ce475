//! Configuration management module.
//!
//! This module provides:
//! - YAML, TOML and JSON configuration files
//! - Validation with path-qualified error messages
//! - `TETHER_*` environment variable overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::config::{ConfigLoader, TetherConfig, Validatable};
//!
//! let mut config: TetherConfig = ConfigLoader::new().load_file("tether.yaml")?;
//! config.apply_env_overrides();
//! config.validate()?;
//! ```

mod loader;
mod tether_config;
mod traits;
pub mod validation;

pub use loader::{ConfigFormat, ConfigLoader};
pub use tether_config::{
    BackendConfig, CacheSettings, LoggingConfig, RealtimeSettings, TetherConfig,
};
pub use traits::Validatable;
pub use validation::{EnvOverride, ValidationContext, ValidationResult, Validator};
