//! Outbox Dispatcher Service
//!
//! Periodically hands due outbox entries of one vault to its bridge. Adapter
//! calls may block on network I/O, so each drain runs on the blocking pool
//! while holding the vault's write lock.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use super::SharedVault;
use crate::protocol::DispatchReport;
use crate::types::unix_millis;

pub struct OutboxDispatcher {
    vault: SharedVault,
    interval: Duration,
}

impl OutboxDispatcher {
    pub fn new(vault: SharedVault, interval: Duration) -> Self {
        Self { vault, interval }
    }

    /// Drains the outbox once.
    pub async fn tick(&self) -> Result<DispatchReport> {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || {
            let mut vault = vault.blocking_write();
            vault.dispatch_pending(unix_millis())
        })
        .await
        .context("Outbox drain task panicked")
    }

    /// Service loop: drain, log, sleep.
    pub async fn run(&self) -> Result<()> {
        let chain = self.vault.read().await.chain();
        info!(
            "Starting outbox dispatcher for {} (interval: {:?})",
            chain, self.interval
        );

        loop {
            match self.tick().await {
                Ok(report) if !report.is_idle() => info!(
                    "Outbox {}: {} dispatched, {} retrying, {} failed",
                    chain, report.dispatched, report.retried, report.failed
                ),
                Ok(_) => {}
                Err(e) => error!("Error draining outbox for {}: {:#}", chain, e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
