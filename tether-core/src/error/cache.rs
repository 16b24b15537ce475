//! Cache error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cache error type.
///
/// `Miss` is the hard failure of the cache-only strategy; the router routes it to
/// the offline handler.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheError {
    /// The requested key is not in the cache.
    #[error("[Cache] Resource not found in cache: {key}")]
    Miss {
        /// Cache key (request URL).
        key: String,
    },

    /// The durable storage backing a partition failed.
    #[error("[Cache] Storage error: {reason}")]
    Storage {
        /// Reason for the storage failure.
        reason: String,
    },

    /// An entry could not be encoded or decoded.
    #[error("[Cache] Serialization error: {reason}")]
    Serialization {
        /// Reason for the serialization failure.
        reason: String,
    },
}

impl CacheError {
    /// Returns the severity level of this error.
    #[must_use]
    pub fn severity(&self) -> super::ErrorSeverity {
        use super::ErrorSeverity;
        match self {
            Self::Miss { .. } => ErrorSeverity::Recoverable,
            Self::Storage { .. } | Self::Serialization { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns true if this is a cache miss.
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss { .. })
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss() {
        let error = CacheError::Miss {
            key: "/offline.html".to_string(),
        };
        assert!(error.is_miss());
        assert!(error.to_string().contains("/offline.html"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: CacheError = io.into();
        assert!(matches!(error, CacheError::Storage { .. }));
    }
}
