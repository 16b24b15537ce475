//! # Tether Proxy
//!
//! ```bash
//! # Run with default configuration
//! tether-proxy
//!
//! # Run with a custom configuration file
//! tether-proxy --config /path/to/tether.yaml
//!
//! # Point at another backend
//! TETHER_SERVER_UPSTREAM=https://panel.example.com tether-proxy
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use tether_server::{ProxyConfig, TetherProxy};

/// Tether caching proxy
#[derive(Parser, Debug)]
#[command(name = "tether-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tether.yaml")]
    config: PathBuf,

    /// Override listen host
    #[arg(long, env = "TETHER_SERVER_HOST")]
    host: Option<String>,

    /// Override listen port
    #[arg(long, env = "TETHER_SERVER_PORT")]
    port: Option<u16>,

    /// Override upstream backend
    #[arg(long, env = "TETHER_SERVER_UPSTREAM")]
    upstream: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    if args.validate {
        println!("Configuration is valid");
        return;
    }

    match run_proxy(config).await {
        Ok(()) => info!("Tether proxy stopped"),
        Err(e) => {
            error!(error = %e, "Proxy error");
            eprintln!("Proxy error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Loads configuration from file and applies command-line overrides.
fn load_config(args: &Args) -> anyhow::Result<ProxyConfig> {
    let mut config = if args.config.exists() {
        TetherProxy::load_config(&args.config)?
    } else {
        eprintln!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );
        let mut config = ProxyConfig::default();
        config.apply_env_overrides();
        config
    };

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(upstream) = &args.upstream {
        config.server.upstream = Some(upstream.clone());
    }
    if args.debug {
        config.tether.logging.level = "debug".to_string();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run_proxy(config: ProxyConfig) -> anyhow::Result<()> {
    let mut proxy = TetherProxy::new(config);
    proxy.initialize().await?;
    proxy.run().await?;
    Ok(())
}
