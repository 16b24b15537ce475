//! Backend endpoints used by the heartbeat monitor and the reconnect controller.

use async_trait::async_trait;
use serde_json::Value;
use tether_core::error::{AuthError, NetworkError, TetherError};
use tracing::debug;

use super::client::RestClient;

/// Liveness endpoint.
pub const HEARTBEAT_PATH: &str = "/api/heartbeat";

/// Credential re-validation endpoint.
pub const VALIDATE_PATH: &str = "/api/auth/validate";

/// Periodic liveness check against the backend.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Succeeds when the backend answers with a 2xx status.
    async fn probe(&self, token: Option<&str>) -> Result<(), NetworkError>;
}

/// Re-validates a stored session credential.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Succeeds when the backend still accepts `token`.
    ///
    /// A rejected token is a [`TetherError::Auth`]; anything else that prevents
    /// an answer is a [`TetherError::Network`].
    async fn validate(&self, token: &str) -> Result<(), TetherError>;
}

#[async_trait]
impl LivenessProbe for RestClient {
    async fn probe(&self, token: Option<&str>) -> Result<(), NetworkError> {
        let mut request = self.get(HEARTBEAT_PATH);
        if let Some(token) = token {
            request = request.bearer(token);
        }
        request.send_checked().await.map(|_| ())
    }
}

#[async_trait]
impl CredentialValidator for RestClient {
    async fn validate(&self, token: &str) -> Result<(), TetherError> {
        let response = self.post(VALIDATE_PATH).bearer(token).send().await?;
        let status = response.status().as_u16();

        match status {
            401 | 403 => Err(AuthError::InvalidToken {
                status_code: status,
            }
            .into()),
            200..=299 => {
                let body: Value = response.json().await.map_err(|e| NetworkError::Http {
                    status_code: status,
                    reason: format!("Failed to parse validation response: {e}"),
                })?;
                if body.get("user").is_some_and(|user| !user.is_null()) {
                    debug!("Session credential still valid");
                    Ok(())
                } else {
                    Err(AuthError::InvalidToken {
                        status_code: status,
                    }
                    .into())
                }
            }
            _ => Err(NetworkError::Http {
                status_code: status,
                reason: "credential validation failed".to_string(),
            }
            .into()),
        }
    }
}
