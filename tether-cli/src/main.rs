//! # Tether CLI
//!
//! Command-line interface for the Tether connection-resilience layer.
//!
//! This CLI provides commands for:
//! - Watching the realtime stream with automatic reconnection
//! - Inspecting and driving a running caching proxy
//! - Managing the persisted session token and theme

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use commands::{cache, session, watch};

/// Tether - resilient realtime and offline-first access to the admin backend
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "tether.yaml")]
    config: String,

    /// Base URL of a running tether-proxy
    #[arg(
        long,
        global = true,
        env = "TETHER_PROXY",
        default_value = "http://127.0.0.1:8787"
    )]
    proxy: String,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Stream realtime messages and connection notifications
    Watch(watch::WatchArgs),

    /// Talk to the cache worker of a running proxy
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Store the session token used to authenticate
    Login(session::LoginArgs),

    /// Remove the stored session token
    Logout,

    /// Show or set the theme preference
    Theme(session::ThemeArgs),

    /// Show system information
    Info,
}

/// Cache worker subcommands
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Item count and keys of every cache partition
    Status,

    /// Delete every cache partition
    Clear,

    /// Cache hit, miss, network and offline counters
    Metrics,

    /// Queue a command for delivery when the backend is reachable
    Queue(cache::QueueArgs),

    /// Activate a waiting worker immediately
    SkipWaiting,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Watch(args) => {
            let config = commands::load_config(&cli.config)?;
            watch::run(&config, args).await?;
        }
        Commands::Cache(cmd) => {
            let proxy = cache::ProxyClient::new(&cli.proxy)?;
            match cmd {
                CacheCommands::Status => cache::status(&proxy).await?,
                CacheCommands::Clear => cache::clear(&proxy).await?,
                CacheCommands::Metrics => cache::metrics(&proxy).await?,
                CacheCommands::Queue(args) => cache::queue(&proxy, args).await?,
                CacheCommands::SkipWaiting => cache::skip_waiting(&proxy).await?,
            }
        }
        Commands::Login(args) => {
            let config = commands::load_config(&cli.config)?;
            session::login(&config, &args)?;
        }
        Commands::Logout => {
            let config = commands::load_config(&cli.config)?;
            session::logout(&config)?;
        }
        Commands::Theme(args) => {
            let config = commands::load_config(&cli.config)?;
            session::theme(&config, &args)?;
        }
        Commands::Info => print_info(&cli),
    }

    Ok(())
}

fn print_info(cli: &Cli) {
    println!("Tether");
    println!("======");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Rust Edition: 2024");
    println!();
    println!("Configuration: {}", cli.config);
    println!("Proxy: {}", cli.proxy);
    println!();
    println!("Realtime:");
    println!("  - Heartbeat every 30s, 5s probe timeout");
    println!("  - Exponential reconnect backoff, 5 attempts");
    println!("  - Outbound queue and request/reply correlation");
    println!();
    println!("Caching proxy:");
    println!("  - cache-first, network-first, stale-while-revalidate,");
    println!("    network-only and cache-only routes");
    println!("  - Offline fallback, command queue and background sync");
    println!("  - Hourly expiry of API responses older than 24h");
}
