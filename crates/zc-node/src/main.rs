//! zc-node - rebuilds and checks zerocoin accumulator state from a block index.
//!
//! This is the main entry point for the zc-node binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// Zerocoin accumulator state tracker.
#[derive(Parser, Debug)]
#[command(name = "zc-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "zc-node.toml")]
    config: PathBuf,

    /// Network whose rules apply
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Block index to load (JSON)
    #[arg(long)]
    chain_index: Option<PathBuf>,

    /// Write the index back with recalculated accumulators
    #[arg(long)]
    export_index: Option<PathBuf>,

    /// Compare the built state with a fresh rebuild
    #[arg(long)]
    self_check: bool,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Print version and exit
    #[arg(long)]
    version_info: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version_info {
        print_version();
        return Ok(());
    }

    let config = NodeConfig::load(&args.config, &args)?;

    // Initialize logging
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting zc-node v{}", env!("CARGO_PKG_VERSION"));
    info!("Network: {}", config.network);
    info!("Block index: {:?}", config.chain_index);

    let node = Node::new(config)?;

    // Stop bulk work between blocks on Ctrl-C
    let shutdown = node.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    match node.run().await {
        Ok(report) => {
            for group in &report.groups {
                info!(
                    denomination = %group.denomination,
                    id = group.id,
                    first = group.first_height,
                    last = group.last_height,
                    coins = group.n_coins,
                    "Coin group"
                );
            }
            info!(
                height = ?report.height,
                recalculated = report.changed_blocks.len(),
                self_check = ?report.self_check,
                "zc-node finished"
            );
            if report.self_check == Some(false) {
                anyhow::bail!("zerocoin state self check failed");
            }
        }
        Err(e) => {
            tracing::error!("Node error: {:#}", e);
            return Err(e);
        }
    }

    Ok(())
}

fn print_version() {
    println!("zc-node");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Built with:");
    println!("  num-bigint for accumulator arithmetic");
    println!("  Tokio for async runtime");
}
