//! In-process loopback adapter.
//!
//! Accepted messages are appended to a shared [`Mailbox`] that a relay drains
//! and delivers to destination vaults running in the same process. Used for
//! local devnets and tests. The adapter can be switched to reject sends at
//! dispatch time, or to accept and silently drop them, so both failure modes
//! of a real bridge can be exercised.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::{AdapterError, BridgeAdapter, DeliveryId};
use crate::chains::{ChainId, ChainNameTable};
use crate::types::Amount;

/// Linear fee model: `base_fee + fee_per_byte * payload_len`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeModel {
    #[serde(default)]
    pub base_fee: Amount,
    #[serde(default)]
    pub fee_per_byte: Amount,
}

impl FeeModel {
    pub fn quote(&self, payload_len: usize) -> Amount {
        self.base_fee
            .saturating_add(self.fee_per_byte.saturating_mul(payload_len as Amount))
    }
}

/// A message accepted by a loopback adapter, waiting for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_id: DeliveryId,
    pub protocol: String,
    pub source_chain: ChainId,
    pub dest_chain: ChainId,
    /// Destination chain as named by the protocol.
    pub dest_chain_name: String,
    pub dest_addr: String,
    pub payload: Vec<u8>,
    pub fee: Amount,
}

/// Shared FIFO of accepted deliveries.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    inner: Arc<Mutex<VecDeque<Delivery>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, delivery: Delivery) {
        self.lock().push_back(delivery);
    }

    /// Removes and returns everything queued so far.
    pub fn drain(&self) -> Vec<Delivery> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Delivery>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct LoopbackAdapter {
    source_chain: ChainId,
    names: ChainNameTable,
    fee_model: FeeModel,
    mailbox: Mailbox,
    rejecting: AtomicBool,
    dropping: AtomicBool,
    accepted: AtomicU64,
}

impl LoopbackAdapter {
    /// Creates an adapter sending from `source_chain`; the protocol name is
    /// taken from the name table.
    pub fn new(
        source_chain: ChainId,
        names: ChainNameTable,
        fee_model: FeeModel,
        mailbox: Mailbox,
    ) -> Self {
        Self {
            source_chain,
            names,
            fee_model,
            mailbox,
            rejecting: AtomicBool::new(false),
            dropping: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
        }
    }

    /// Rejects every send at dispatch time while set.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Accepts sends but never enqueues them while set (message lost after dispatch).
    pub fn set_dropping(&self, dropping: bool) {
        self.dropping.store(dropping, Ordering::SeqCst);
    }

    /// Number of sends accepted so far, including dropped ones.
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> &ChainNameTable {
        &self.names
    }
}

impl BridgeAdapter for LoopbackAdapter {
    fn protocol_name(&self) -> &str {
        self.names.protocol()
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.names.chains()
    }

    fn supports(&self, chain: ChainId) -> bool {
        self.names.contains(chain)
    }

    fn estimate_fee(&self, dest_chain: ChainId, payload: &[u8]) -> Result<Amount, AdapterError> {
        if !self.names.contains(dest_chain) {
            return Err(AdapterError::UnsupportedChain(dest_chain));
        }
        Ok(self.fee_model.quote(payload.len()))
    }

    fn send(
        &self,
        dest_chain: ChainId,
        dest_addr: &str,
        payload: &[u8],
        fee: Amount,
    ) -> Result<DeliveryId, AdapterError> {
        let dest_chain_name = self
            .names
            .name_for(dest_chain)
            .ok_or(AdapterError::UnsupportedChain(dest_chain))?
            .to_string();

        if self.rejecting.load(Ordering::SeqCst) {
            return Err(AdapterError::Rejected(format!(
                "{} endpoint is not accepting messages",
                self.protocol_name()
            )));
        }

        let required = self.fee_model.quote(payload.len());
        if fee < required {
            return Err(AdapterError::FeeTooLow {
                provided: fee,
                required,
            });
        }

        let delivery_id = format!("0x{}", hex::encode(rand::random::<[u8; 16]>()));
        self.accepted.fetch_add(1, Ordering::SeqCst);

        if self.dropping.load(Ordering::SeqCst) {
            warn!(
                "Loopback '{}' accepted delivery {} to {} but dropped it",
                self.protocol_name(),
                delivery_id,
                dest_chain
            );
            return Ok(delivery_id);
        }

        debug!(
            "Loopback '{}' queued delivery {} {} -> {} ({})",
            self.protocol_name(),
            delivery_id,
            self.source_chain,
            dest_chain,
            dest_chain_name
        );
        self.mailbox.push(Delivery {
            delivery_id: delivery_id.clone(),
            protocol: self.protocol_name().to_string(),
            source_chain: self.source_chain,
            dest_chain,
            dest_chain_name,
            dest_addr: dest_addr.to_string(),
            payload: payload.to_vec(),
            fee,
        });
        Ok(delivery_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(mailbox: Mailbox) -> LoopbackAdapter {
        LoopbackAdapter::new(
            ChainId::Ethereum,
            ChainNameTable::new(
                "lz",
                vec![
                    (ChainId::Base, "40245".to_string()),
                    (ChainId::Arbitrum, "40231".to_string()),
                ],
            )
            .unwrap(),
            FeeModel {
                base_fee: 100,
                fee_per_byte: 2,
            },
            mailbox,
        )
    }

    #[test]
    fn test_fee_quote_is_linear_in_payload() {
        let adapter = adapter(Mailbox::new());
        assert_eq!(adapter.estimate_fee(ChainId::Base, &[0u8; 10]).unwrap(), 120);
        assert_eq!(
            adapter.estimate_fee(ChainId::Polygon, &[]),
            Err(AdapterError::UnsupportedChain(ChainId::Polygon))
        );
    }

    #[test]
    fn test_send_queues_translated_name() {
        let mailbox = Mailbox::new();
        let adapter = adapter(mailbox.clone());
        adapter.send(ChainId::Base, "0xabc", b"hello", 1_000).unwrap();

        let queued = mailbox.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].dest_chain_name, "40245");
        assert_eq!(queued[0].source_chain, ChainId::Ethereum);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_send_rejects_underpaid_fee() {
        let adapter = adapter(Mailbox::new());
        assert_eq!(
            adapter.send(ChainId::Base, "0xabc", &[0u8; 10], 119),
            Err(AdapterError::FeeTooLow {
                provided: 119,
                required: 120
            })
        );
    }

    #[test]
    fn test_dropping_accepts_without_queueing() {
        let mailbox = Mailbox::new();
        let adapter = adapter(mailbox.clone());
        adapter.set_dropping(true);

        assert!(adapter.send(ChainId::Base, "0xabc", b"x", 1_000).is_ok());
        assert_eq!(adapter.accepted_count(), 1);
        assert!(mailbox.is_empty());
    }
}
