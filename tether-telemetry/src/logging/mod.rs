//! Structured logging for Tether.
//!
//! Provides configurable logging with support for:
//! - JSON and pretty-print formats
//! - Stdout and rolling file outputs
//! - `RUST_LOG` level overrides
//! - Masking of session tokens before they reach any output

mod config;
mod writer;

pub use config::{LogConfig, LogFormat, LogOutput, RotationConfig};
pub use writer::{MaskingMakeWriter, MaskingWriter};

use crate::masking::SensitiveDataMasker;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const LOG_FILE_NAME: &str = "tether.log";

/// Initialize the logging system with the given configuration.
///
/// Returns guards that must be kept alive for the duration of the program
/// so buffered file output is flushed.
///
/// # Example
///
/// ```no_run
/// use tether_telemetry::logging::{init_logging, LogConfig};
///
/// let _guards = init_logging(&LogConfig::default()).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    let mut guards = Vec::new();
    let masker = config
        .mask_sensitive
        .then(|| Arc::new(SensitiveDataMasker::new()));

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| LoggingError::InvalidConfig(e.to_string()))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    for output in &config.outputs {
        match output {
            LogOutput::Stdout => {
                let writer = MaskingMakeWriter::new(std::io::stdout, masker.clone());
                layers.push(format_layer(config, writer));
            }
            LogOutput::File { path, rotation } => {
                std::fs::create_dir_all(path)?;
                let appender = match rotation.unwrap_or(RotationConfig::Daily) {
                    RotationConfig::Hourly => tracing_appender::rolling::hourly(path, LOG_FILE_NAME),
                    RotationConfig::Daily => tracing_appender::rolling::daily(path, LOG_FILE_NAME),
                    RotationConfig::Never => tracing_appender::rolling::never(path, LOG_FILE_NAME),
                };
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let writer = MaskingMakeWriter::new(non_blocking, masker.clone());
                // Files always get JSON so they can be shipped as-is.
                layers.push(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(config.include_file_info)
                        .with_line_number(config.include_file_info)
                        .json()
                        .flatten_event(true)
                        .boxed(),
                );
                guards.push(guard);
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guards)
}

fn format_layer<W>(config: &LogConfig, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(config.include_file_info)
        .with_line_number(config.include_file_info);

    match config.format {
        LogFormat::Json => base.json().flatten_event(true).boxed(),
        LogFormat::Pretty => base.compact().boxed(),
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create log directory
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),

    /// A global subscriber is already installed
    #[error("Logging already initialized")]
    AlreadyInitialized,
}
