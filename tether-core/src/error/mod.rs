//! Error types and handling framework.
//!
//! The error system is organized hierarchically:
//! - `TetherError` - Top-level error type
//!   - `NetworkError` - Transport, timeout and fetch failures
//!   - `AuthError` - Missing, invalid or expired credentials
//!   - `CacheError` - Cache misses and storage failures
//!   - `ConfigError` - Configuration errors
//!
//! # Propagation
//!
//! Transport and timeout errors raised by the heartbeat are recovered by the
//! reconnect controller and only surface as status notifications. Auth errors are
//! surfaced immediately. Cache misses and exhausted network errors inside the cache
//! router are turned into an offline response and never reach the caller.
//!
//! ```
//! use tether_core::error::{NetworkError, TetherError};
//!
//! let error: TetherError = NetworkError::Timeout { timeout_ms: 5000 }.into();
//! assert!(error.is_recoverable());
//! assert_eq!(error.category(), "network");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error severity levels for categorizing errors.
///
/// - `Fatal`: Unrecoverable, requires user action (e.g. reload or log in again)
/// - `Recoverable`: Can be retried or recovered from automatically
/// - `Warning`: Non-critical issue, degraded functionality
/// - `Info`: Expected condition worth noting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Unrecoverable error requiring user action.
    Fatal,

    /// Error that the system retries or falls back from.
    #[default]
    Recoverable,

    /// Non-critical issue that should be logged.
    Warning,

    /// Informational message about an expected condition.
    Info,
}

impl ErrorSeverity {
    /// Returns true if this error is recoverable (not fatal).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal)
    }

    /// Returns true if this error is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    /// Returns the severity as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Recoverable => "RECOVERABLE",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

mod auth;
mod cache;
mod config;
mod network;

pub use auth::AuthError;
pub use cache::CacheError;
pub use config::ConfigError;
pub use network::NetworkError;

/// Top-level error type for the Tether crates.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TetherError {
    /// Network, transport or timeout error.
    #[error("{0}")]
    Network(#[from] NetworkError),

    /// Authentication error.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Cache error.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl TetherError {
    /// Returns the severity level of this error.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network(e) => e.severity(),
            Self::Auth(e) => e.severity(),
            Self::Cache(e) => e.severity(),
            Self::Config(e) => e.severity(),
        }
    }

    /// Returns true if this error is recoverable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.severity().is_recoverable()
    }

    /// Returns the error category as a string.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::Cache(_) => "cache",
            Self::Config(_) => "config",
        }
    }

    /// Returns the inner network error, if this is a network error.
    #[must_use]
    pub fn as_network_error(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if this is an authentication error.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// A specialized Result type for Tether operations.
pub type Result<T> = std::result::Result<T, TetherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity_display() {
        assert_eq!(ErrorSeverity::Fatal.to_string(), "FATAL");
        assert_eq!(ErrorSeverity::Recoverable.to_string(), "RECOVERABLE");
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARNING");
        assert_eq!(ErrorSeverity::Info.to_string(), "INFO");
    }

    #[test]
    fn test_network_error_conversion() {
        let network_err = NetworkError::Timeout { timeout_ms: 5000 };
        let err: TetherError = network_err.clone().into();
        assert_eq!(err.category(), "network");
        assert_eq!(err.as_network_error(), Some(&network_err));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_auth_error_is_fatal() {
        let err: TetherError = AuthError::SessionExpired.into();
        assert!(err.is_auth_error());
        assert_eq!(err.severity(), ErrorSeverity::Fatal);
    }

    #[test]
    fn test_cache_miss_is_recoverable() {
        let err: TetherError = CacheError::Miss {
            key: "/js/app.js".to_string(),
        }
        .into();
        assert_eq!(err.category(), "cache");
        assert!(err.is_recoverable());
    }
}
