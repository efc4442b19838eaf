//! Credit Vault Devnet
//!
//! Runs every configured vault in one process:
//! - Outbox dispatchers: drain each vault's outbox through its bridges
//! - Loopback relay: delivers accepted messages to destination vaults
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin credit-vault -- --config config/credit-vault.toml
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! CREDIT_VAULT_CONFIG_PATH=config/credit-vault.toml cargo run --bin credit-vault
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use credit_vault::config::{VaultConfig, CONFIG_PATH_ENV};
use credit_vault::devnet::Devnet;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "credit-vault")]
#[command(about = "Cross-chain credit vault devnet - syncs positions between in-process vaults")]
struct Args {
    /// Path to configuration file (default: config/credit-vault.toml or CREDIT_VAULT_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Run this many dispatch/relay rounds, print summaries and exit
    #[arg(short, long)]
    ticks: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    info!("Starting credit vault devnet");

    // Priority: CLI arg > env var > default
    let config = if let Some(path) = args.config {
        info!("Loading configuration from: {}", path);
        VaultConfig::load_from_path(Some(&path))?
    } else {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            info!("Loading configuration from {}: {}", CONFIG_PATH_ENV, path);
        } else {
            info!("Loading configuration from default location");
        }
        VaultConfig::load()?
    };

    info!(
        "Configuration loaded: {} vault(s), {} protocol(s)",
        config.vault.len(),
        config.protocol.len()
    );

    // HTTP adapters hold blocking clients, build them off the async runtime
    let devnet = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Devnet::build(&config))
            .await
            .context("Devnet build task panicked")??
    };
    devnet.run_demo_actions(&config).await?;

    let dispatch_interval = Duration::from_millis(config.service.dispatch_interval_ms);
    let relay_interval = Duration::from_millis(config.service.relay_interval_ms);

    if let Some(ticks) = args.ticks {
        for round in 1..=ticks {
            let (dispatched, report) = devnet.step().await?;
            info!(
                "Round {}: {} dispatched, {} applied, {} replayed, {} superseded, {} rejected",
                round, dispatched, report.applied, report.replayed, report.superseded, report.rejected
            );
            tokio::time::sleep(dispatch_interval.min(relay_interval)).await;
        }
        devnet.log_summaries().await;
        return Ok(());
    }

    info!("Starting all services...");
    for dispatcher in devnet.dispatchers(dispatch_interval) {
        tokio::spawn(async move {
            if let Err(e) = dispatcher.run().await {
                error!("Outbox dispatcher error: {}", e);
            }
        });
    }
    let relay = devnet.relay(relay_interval);

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = result {
                error!("Relay service error: {}", e);
            }
        }

        // Graceful shutdown on Ctrl+C
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping services...");
        }
    }

    devnet.log_summaries().await;
    info!("Credit vault devnet stopped");
    Ok(())
}
