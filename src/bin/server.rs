//! # Server Binary Entry Point
//!
//! Thin wrapper that runs one synchronization session.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server -- --config config/server.toml
//! ```
//!
//! The server will:
//! 1. Load configuration from the specified TOML file
//! 2. Bind the listener and start the session coordinator
//! 3. Admit peers, arbitrate hostship and forward the host's state
//! 4. Close every connection on Ctrl-C

use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;

use parallel_session::common::config::load_config;
use parallel_session::server::{ServerConfig, SessionServer};

/// Command-line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the server configuration file (TOML format)
    ///
    /// Example: config/server.toml
    #[arg(short, long)]
    config: String,

    /// Override the listen address from the configuration file
    #[arg(long)]
    address: Option<String>,

    /// Log protocol details (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger(verbose: bool) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let mut config: ServerConfig = load_config(&args.config)?;
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let server = SessionServer::bind(config).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⏹️  Ctrl-C received, closing session");
            handle.shutdown().await;
        }
    });

    server.run().await;

    Ok(())
}
