//! REST client infrastructure.
//!
//! - [`RestClient`] with bearer authentication and retry of recoverable failures
//! - [`LivenessProbe`] (`GET /api/heartbeat`) and [`CredentialValidator`]
//!   (`POST /api/auth/validate`), the backend seams of the realtime client
//!
//! # Example
//!
//! ```ignore
//! use tether_gateway::rest::{LivenessProbe, RestClient, RestConfig};
//!
//! let config = RestConfig::builder()
//!     .base_url("http://127.0.0.1:8080")
//!     .build();
//!
//! let client = RestClient::new(config)?;
//! client.probe(Some("session-token")).await?;
//! ```

mod backend;
mod client;
mod config;

pub use backend::{CredentialValidator, HEARTBEAT_PATH, LivenessProbe, VALIDATE_PATH};
pub use client::{RequestBuilder, RestClient};
pub use config::{RestConfig, RestConfigBuilder};
