//! # Tether Telemetry
//!
//! Logging, tracing and metrics for the Tether realtime client and cache router.
//!
//! This crate provides:
//! - Structured logging with JSON and pretty formats
//! - Rolling log files
//! - Masking of session tokens and passwords in log output
//! - Spans for requests, cache routing and reconnect attempts
//! - Prometheus metrics export

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Sensitive data masking
pub mod masking;

/// Span definitions for tracing
pub mod spans;

/// Metrics collection and export
pub mod metrics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{LogConfig, LogFormat, LogOutput, init_logging};
    pub use crate::masking::{Sensitive, SensitiveDataMasker};
    pub use crate::metrics::{MetricsConfig, TetherMetrics, init_metrics};
    pub use crate::spans::*;
}
