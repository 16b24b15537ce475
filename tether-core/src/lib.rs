//! # Tether Core
//!
//! Core types, errors and configuration shared by the Tether crates.
//!
//! This crate provides:
//! - `NewType` wrappers for identifiers and timestamps (`Timestamp`, `ChannelId`, `RequestId`)
//! - The error taxonomy for transport, authentication, timeout, network and cache failures
//! - Configuration management with YAML/TOML/JSON support and environment variable overrides

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

/// Core type definitions and 'NewType' wrappers
pub mod types;

/// Error types and handling
pub mod error;

/// Configuration management
pub mod config;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{
        AuthError, CacheError, ConfigError, ErrorSeverity, NetworkError, TetherError,
    };
    pub use crate::types::*;
}
