//! Proxy lifecycle: configuration, telemetry, worker startup, serving and
//! graceful shutdown.

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use tether_cache::{CacheConfig, CacheStore, CacheWorker, Fetcher, FileCacheStore, HttpFetcher};
use tether_core::config::ConfigLoader;
use tether_telemetry::logging::{LogConfig, init_logging};
use tether_telemetry::metrics::init_metrics;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::app::{AppState, router};
use crate::config::ProxyConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::shutdown::{ShutdownController, setup_signal_handlers};

/// Lifecycle stage of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started, or fully stopped.
    Stopped,
    /// Telemetry initialized.
    Starting,
    /// Accepting connections.
    Running,
    /// Draining connections and stopping background tasks.
    ShuttingDown,
}

/// The caching proxy.
pub struct TetherProxy {
    config: ProxyConfig,
    state: Arc<RwLock<ServerState>>,
    shutdown: ShutdownController,
    _log_guards: Vec<WorkerGuard>,
}

impl TetherProxy {
    /// Creates a stopped proxy.
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            shutdown: ShutdownController::new(),
            _log_guards: Vec::new(),
        }
    }

    /// Loads, overrides and validates the configuration at `path`.
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProxyConfig, ServerError> {
        let mut config: ProxyConfig = ConfigLoader::new()
            .load_file(path)
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        config.apply_env_overrides();
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Current lifecycle stage.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Initializes logging and metrics.
    pub async fn initialize(&mut self) -> Result<(), ServerError> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Stopped {
                return Err(ServerError::InvalidState(
                    "Proxy must be stopped to initialize".to_string(),
                ));
            }
            *state = ServerState::Starting;
        }

        let log_config = LogConfig::from(&self.config.tether.logging);
        self._log_guards = init_logging(&log_config).map_err(|e| {
            ServerError::InitializationError(format!("Failed to initialize logging: {e}"))
        })?;
        info!(level = %log_config.level, "Logging initialized");

        match init_metrics(&self.config.server.metrics) {
            Ok(()) => info!("Metrics initialized"),
            Err(e) => warn!(error = %e, "Metrics initialization failed"),
        }
        Ok(())
    }

    /// Builds the worker, installs and activates it, then serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Starting {
                return Err(ServerError::InvalidState(
                    "Proxy must be initialized before running".to_string(),
                ));
            }
            *state = ServerState::Running;
        }

        let worker = Arc::new(self.start_worker().await?);
        let sweeper = worker.expiry_sweeper().spawn();
        let monitor = Arc::new(
            ConnectivityMonitor::new(Arc::clone(&worker), self.config.server.connectivity_interval)
                .with_analytics_sync(self.config.server.analytics_sync),
        )
        .spawn();

        let listener = TcpListener::bind(self.config.bind_address())
            .await
            .map_err(|e| {
                ServerError::InitializationError(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address()
                ))
            })?;
        info!(
            address = %self.config.bind_address(),
            upstream = %self.config.upstream(),
            "Tether proxy listening"
        );

        let shutdown_ctrl = self.shutdown.clone();
        tokio::spawn(async move {
            setup_signal_handlers(shutdown_ctrl).await;
        });

        let app = router(Arc::new(AppState::new(worker))).layer(TraceLayer::new_for_http());
        let shutdown = self.shutdown.clone();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
            .into_future();

        let drain = self.shutdown.clone();
        let timeout = self.config.shutdown.timeout();
        let result = tokio::select! {
            result = serve => result.map_err(|e| ServerError::RuntimeError(e.to_string())),
            () = async move {
                drain.wait_for_shutdown().await;
                tokio::time::sleep(timeout).await;
            } => {
                warn!(timeout = ?timeout, "Connections still open after shutdown timeout");
                Ok(())
            }
        };

        sweeper.abort();
        monitor.abort();
        self.graceful_shutdown().await;
        result
    }

    /// Requests shutdown.
    pub fn shutdown(&self) {
        self.shutdown.initiate_shutdown();
    }

    async fn start_worker(&self) -> Result<CacheWorker, ServerError> {
        let cache_config = CacheConfig::from(&self.config.tether.cache);
        let store: Arc<dyn CacheStore> = Arc::new(
            FileCacheStore::open(&cache_config.storage_dir)
                .await
                .map_err(|e| ServerError::InitializationError(e.to_string()))?,
        );
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            HttpFetcher::new(self.config.upstream(), self.config.server.request_timeout())
                .map_err(|e| ServerError::InitializationError(e.to_string()))?,
        );

        let worker = CacheWorker::new(cache_config, store, fetcher);
        let report = worker
            .install()
            .await
            .map_err(|e| ServerError::InitializationError(e.to_string()))?;
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "Some URLs could not be pre-cached");
        }
        let stale = worker
            .activate()
            .await
            .map_err(|e| ServerError::InitializationError(e.to_string()))?;
        info!(removed = stale.len(), "Cache worker ready");
        Ok(worker)
    }

    async fn graceful_shutdown(&self) {
        *self.state.write().await = ServerState::ShuttingDown;
        info!("Performing graceful shutdown...");

        *self.state.write().await = ServerState::Stopped;
        self.shutdown.mark_complete();
        info!("Graceful shutdown complete");
    }
}

/// Proxy lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Telemetry, storage or listener setup failed.
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Lifecycle method called in the wrong stage.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The listener failed while serving.
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_proxy_new_is_stopped() {
        let proxy = TetherProxy::new(ProxyConfig::default());
        assert_eq!(proxy.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_run_requires_initialize() {
        let proxy = TetherProxy::new(ProxyConfig::default());
        let result = proxy.run().await;
        assert!(matches!(result, Err(ServerError::InvalidState(_))));
        assert_eq!(proxy.state().await, ServerState::Stopped);
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  upstream: \"ftp://backend\"").unwrap();
        let result = TetherProxy::load_config(file.path());
        assert!(matches!(result, Err(ServerError::ConfigError(_))));

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  port: 9100").unwrap();
        let config = TetherProxy::load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::ConfigError("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }
}
