//! Loopback Relay Service
//!
//! Drains the shared loopback mailbox and delivers each message to the vault
//! on its destination chain, the way an off-chain GMP relay would. Rejected
//! envelopes are logged and dropped; the relay never retries them.

use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::SharedVault;
use crate::bridge::{Delivery, Mailbox};
use crate::chains::ChainId;
use crate::protocol::{Envelope, ReceiveOutcome};

/// Counters for one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub applied: usize,
    pub replayed: usize,
    pub superseded: usize,
    pub rejected: usize,
}

impl RelayReport {
    pub fn delivered(&self) -> usize {
        self.applied + self.replayed + self.superseded + self.rejected
    }
}

pub struct RelayService {
    mailbox: Mailbox,
    vaults: BTreeMap<ChainId, SharedVault>,
    interval: Duration,
}

impl RelayService {
    pub fn new(mailbox: Mailbox, vaults: BTreeMap<ChainId, SharedVault>, interval: Duration) -> Self {
        Self {
            mailbox,
            vaults,
            interval,
        }
    }

    /// Delivers everything currently in the mailbox.
    pub async fn tick(&self) -> Result<RelayReport> {
        let mut report = RelayReport::default();

        for delivery in self.mailbox.drain() {
            match self.deliver(&delivery).await {
                Some(ReceiveOutcome::Applied) => report.applied += 1,
                Some(ReceiveOutcome::Replayed) => report.replayed += 1,
                Some(ReceiveOutcome::Superseded) => report.superseded += 1,
                None => report.rejected += 1,
            }
        }
        Ok(report)
    }

    /// Service loop: deliver, log, sleep.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting loopback relay for {} chain(s) (interval: {:?})",
            self.vaults.len(),
            self.interval
        );

        loop {
            match self.tick().await {
                Ok(report) if report.delivered() > 0 => info!(
                    "Relay delivered {} message(s): {} applied, {} replayed, {} superseded, {} rejected",
                    report.delivered(),
                    report.applied,
                    report.replayed,
                    report.superseded,
                    report.rejected
                ),
                Ok(_) => {}
                Err(e) => error!("Error relaying messages: {:#}", e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn deliver(&self, delivery: &Delivery) -> Option<ReceiveOutcome> {
        let vault = match self.vaults.get(&delivery.dest_chain) {
            Some(vault) => vault,
            None => {
                warn!(
                    "Delivery {} targets {} which has no vault; dropping",
                    delivery.delivery_id, delivery.dest_chain
                );
                return None;
            }
        };

        let envelope = match Envelope::decode(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Delivery {} carries an invalid envelope: {}", delivery.delivery_id, e);
                return None;
            }
        };

        let mut vault = vault.write().await;
        match vault.receive(&envelope) {
            Ok(outcome) => {
                debug!(
                    "Delivery {} ({} via '{}') -> {:?}",
                    delivery.delivery_id, envelope.message_id, delivery.protocol, outcome
                );
                Some(outcome)
            }
            Err(e) => {
                warn!(
                    "Delivery {} rejected by vault on {}: {}",
                    delivery.delivery_id, delivery.dest_chain, e
                );
                None
            }
        }
    }
}
