//! # Client Binary Entry Point
//!
//! Joins a session and prints the synchronized state it receives. With
//! `--host` it requests hostship and, once granted, publishes a ticking
//! simulation clock.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --config config/client.toml
//! cargo run --bin client -- --config config/client.toml --host --name Dome
//! ```

use clap::Parser;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use std::io::Write;
use std::time::{Duration, Instant};

use parallel_session::client::{ClientConfig, SessionEvent, SyncPeer};
use parallel_session::common::config::load_config;
use parallel_session::sync::{SyncEvent, TimeKeyframe};
use parallel_session::Status;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    ///
    /// Example: config/client.toml
    #[arg(short, long)]
    config: String,

    /// Override the display name from the configuration file
    #[arg(long)]
    name: Option<String>,

    /// Request hostship and publish time updates
    #[arg(long)]
    host: bool,

    /// Interval between published time updates (milliseconds)
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger() {
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
        .filter_level(LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config: ClientConfig = load_config(&args.config)?;
    if let Some(name) = args.name {
        config.client.name = name;
    }

    let (peer, mut events) = SyncPeer::connect(&config).await?;
    if args.host {
        peer.request_hostship().await?;
    }

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Sync(event)) => {
                    println!("{}", serde_json::to_string(&event)?);
                }
                Some(SessionEvent::HostshipDenied) => {
                    warn!("🚫 Another instance is host; following it instead");
                }
                Some(SessionEvent::Disconnected) | None => break,
                Some(other) => info!("{:?}", other),
            },
            _ = ticker.tick(), if args.host => {
                if peer.status().await != Status::Host {
                    continue;
                }
                let elapsed = started.elapsed().as_secs_f64();
                let update = SyncEvent::Time(TimeKeyframe {
                    time: elapsed * 60.0,
                    dt: 60.0,
                    paused: false,
                    requires_time_jump: false,
                    timestamp: elapsed,
                });
                if let Err(e) = peer.publish(&update).await {
                    warn!("⚠️  Time update not published: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                peer.disconnect();
                break;
            }
        }
    }

    Ok(())
}
