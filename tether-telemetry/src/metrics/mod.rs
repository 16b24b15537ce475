//! Metrics collection and export for Tether.
//!
//! Counters and gauges for connection health, the outbound queue and the
//! cache router, exported in Prometheus format.

mod config;
mod recorder;

pub use config::MetricsConfig;
pub use recorder::TetherMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
///
/// # Example
///
/// ```no_run
/// use tether_telemetry::metrics::{init_metrics, MetricsConfig};
///
/// init_metrics(&MetricsConfig::default()).expect("Failed to initialize metrics");
/// ```
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    let builder = PrometheusBuilder::new();

    if config.expose_endpoint {
        let addr: SocketAddr = config
            .endpoint_address
            .parse()
            .map_err(|e| MetricsError::InvalidAddress(format!("{e}")))?;

        // Spawns the scrape listener onto the current tokio runtime.
        builder
            .with_http_listener(addr)
            .install()
            .map_err(|e| MetricsError::InitializationFailed(format!("{e}")))?;
    } else {
        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::InitializationFailed(format!("{e}")))?;
        METRICS_HANDLE
            .set(handle)
            .map_err(|_| MetricsError::AlreadyInitialized)?;
    }

    TetherMetrics::register();

    Ok(())
}

/// Render the Prometheus exposition text.
///
/// Empty before initialization and when the scrape listener owns the recorder.
#[must_use]
pub fn render_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Metrics already initialized
    #[error("Metrics system already initialized")]
    AlreadyInitialized,

    /// Invalid endpoint address
    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),

    /// Initialization failed
    #[error("Metrics initialization failed: {0}")]
    InitializationFailed(String),
}
