//! Server binary: hosts the chain store endpoint described by a TOML
//! configuration file, with command-line overrides for the bind address.
//!
//! Configuration priority: command line > configuration file > defaults.
//! Logging verbosity is controlled with `RUST_LOG` (e.g.
//! `RUST_LOG=info chain-cache-server --config config.toml`).

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use chain_cache::config::Config;
use chain_cache::server::Server;

/// Clustered chain store endpoint
#[derive(Parser, Debug)]
#[command(name = "chain-cache-server", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the bind address from the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port from the configuration file
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        info!(
            "Configuration file {} not found, using defaults",
            args.config.display()
        );
        Config::default()
    };

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Multi-threaded runtime: one task per client connection.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async { Server::new(config).run().await })
}
