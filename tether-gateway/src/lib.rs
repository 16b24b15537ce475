//! # Tether Gateway
//!
//! Realtime client of the Tether connection-resilience layer.
//!
//! This crate provides:
//! - A WebSocket connection session with epoch-guarded events
//! - REST access to the backend heartbeat and credential validation endpoints
//! - A heartbeat monitor and an exponential-backoff reconnect controller
//! - A message dispatcher with an outbound queue and request/reply correlation
//! - Persisted client-side state (session token, theme)
//!
//! # Architecture
//!
//! - `ws` - transport and connection session
//! - `rest` - REST client and backend probes
//! - `auth` - credential store
//! - `realtime` - heartbeat, reconnect, dispatch and the client that wires them
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_gateway::prelude::*;
//!
//! let base = "http://127.0.0.1:8080";
//! let client = RealtimeClient::builder()
//!     .websocket(WebSocketConfig::builder().backend(base).build())
//!     .rest(RestClient::new(RestConfig::builder().base_url(base).build())?)
//!     .credentials(Arc::new(CredentialStore::new(JsonFileStore::open("state.json")?)))
//!     .build()?;
//! client.start().await?;
//! ```

#![warn(missing_docs)]
#![allow(clippy::all)]
#![allow(clippy::pedantic)]
#![allow(clippy::cargo)]
#![allow(clippy::nursery)]

/// Transport and connection session
pub mod ws;

/// REST client infrastructure
pub mod rest;

/// Persisted client-side state
pub mod auth;

/// Heartbeat, reconnect and message dispatch
pub mod realtime;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{CredentialStore, JsonFileStore, KeyValueStore, MemoryStore, Theme};
    pub use crate::realtime::{
        DispatchError, LinkStatus, MessageDispatcher, MessageKind, Notification, Notifier,
        OutboundMessage, RealtimeClient, RealtimeClientBuilder, RealtimeConfig, ReconnectPhase,
        SendStatus, handler,
    };
    pub use crate::rest::{CredentialValidator, LivenessProbe, RestClient, RestConfig};
    pub use crate::ws::{
        ConnectionSession, ConnectionState, RealtimeSession, WebSocketConfig, WebSocketTransport,
    };
}
