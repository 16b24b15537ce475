//! Authentication error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication error: the stored session token is missing, rejected by the
/// backend, or the backend pushed `auth_expired`.
///
/// Always surfaced immediately; the session is invalidated and the user is
/// returned to an unauthenticated state.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// No session token is stored.
    #[error("[Auth] No session token available")]
    MissingToken,

    /// The backend rejected the token.
    #[error("[Auth] Invalid session token (status {status_code})")]
    InvalidToken {
        /// Status code returned by the validation endpoint.
        status_code: u16,
    },

    /// The backend reported that the session expired.
    #[error("[Auth] Session expired")]
    SessionExpired,
}

impl AuthError {
    /// Returns the severity level of this error.
    #[must_use]
    pub fn severity(&self) -> super::ErrorSeverity {
        super::ErrorSeverity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_token_display() {
        let error = AuthError::InvalidToken { status_code: 401 };
        assert!(error.to_string().contains("401"));
        assert!(error.severity().is_fatal());
    }
}
