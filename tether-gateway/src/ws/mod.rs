//! Realtime transport and connection session.
//!
//! - [`ConnectionSession`] owns the single live transport, tracks
//!   [`ConnectionState`] and surfaces `Opened` / `Message` / `Closed` / `Error`
//!   events in order
//! - [`WebSocketTransport`] is the tokio-tungstenite [`Transport`], sending the
//!   application ping while open
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_gateway::ws::{ConnectionSession, RealtimeSession, WebSocketConfig, WebSocketTransport};
//!
//! let config = WebSocketConfig::builder()
//!     .backend("https://panel.example.com")
//!     .build();
//! let url = config.url.clone();
//! let (session, mut events) = ConnectionSession::new(url, Arc::new(WebSocketTransport::new(config)));
//! session.open().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

mod client;
mod config;
mod session;
mod state;

pub use client::WebSocketTransport;
pub use config::{WEBSOCKET_PATH, WebSocketConfig, WebSocketConfigBuilder, websocket_url};
pub use session::{
    ABNORMAL_CLOSE, Connection, ConnectionSession, NORMAL_CLOSE, RealtimeSession, SessionEvent,
    Transport, TransportEvent,
};
pub use state::ConnectionState;
