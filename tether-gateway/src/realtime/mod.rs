//! Realtime client: heartbeat, reconnect, message dispatch.
//!
//! - [`RealtimeClient`] is the composition root; it owns the session event loop
//! - [`HeartbeatMonitor`] probes `GET /api/heartbeat` on a fixed period
//! - [`ReconnectController`] runs the backoff state machine
//! - [`MessageDispatcher`] owns the outbound queue, request/reply correlation and
//!   the handler registry
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_gateway::realtime::{RealtimeClient, RealtimeConfig, handler};
//! use tether_gateway::rest::{RestClient, RestConfig};
//! use tether_gateway::ws::WebSocketConfig;
//!
//! let base = "https://panel.example.com";
//! let client = RealtimeClient::builder()
//!     .config(RealtimeConfig::default())
//!     .websocket(WebSocketConfig::builder().backend(base).build())
//!     .rest(RestClient::new(RestConfig::builder().base_url(base).build())?)
//!     .build()?;
//!
//! client.on("console_output", handler(|data| {
//!     println!("{}", data["message"]);
//!     Ok(())
//! }));
//! client.start().await?;
//! ```

mod client;
mod config;
mod dispatcher;
mod heartbeat;
mod notify;
mod protocol;
mod reconnect;

pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use config::{RealtimeConfig, RealtimeConfigBuilder};
pub use dispatcher::{
    DispatchError, DispatchOutcome, FnHandler, HandlerError, MessageDispatcher, MessageHandler,
    SendStatus, handler,
};
pub use heartbeat::{HeartbeatMonitor, HeartbeatStats};
pub use notify::{
    BroadcastNotifier, CompositeNotifier, LinkStatus, LogNotifier, Notification,
    NotificationLevel, Notifier, Presentation,
};
pub use protocol::{InboundMessage, MessageKind, OutboundMessage};
pub use reconnect::{FailureCause, ReconnectController, ReconnectPhase, ReconnectState};
