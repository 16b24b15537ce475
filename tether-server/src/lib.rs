//! # Tether Proxy
//!
//! Local caching proxy that hosts the Tether cache worker in front of the
//! backend, so any HTTP client gets the caching and offline behaviour.
//!
//! This crate provides:
//! - Routing of every request outside `/__tether/` through the cache worker
//! - The worker's message and push channels over HTTP
//! - The hourly expiry sweep and an upstream connectivity monitor that fires
//!   background sync when the backend comes back
//! - Graceful shutdown on SIGINT/SIGTERM

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod connectivity;
pub mod server;
pub mod shutdown;

pub use config::ProxyConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use server::{ServerError, TetherProxy};
pub use shutdown::ShutdownController;
