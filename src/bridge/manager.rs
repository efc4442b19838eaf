//! Bridge Manager
//!
//! Registry of adapters keyed by protocol name plus the preferred protocol
//! for each destination chain. Dispatch performs two independent checks: the
//! preferred-protocol table must name a registered adapter, and that adapter
//! must itself list the destination chain. A mismatch is a configuration
//! error; there is no fallback to another protocol.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use super::{BridgeAdapter, DeliveryId};
use crate::chains::ChainId;
use crate::error::VaultError;
use crate::types::Amount;

/// Result of an accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub protocol: String,
    pub delivery_id: DeliveryId,
}

#[derive(Default)]
pub struct BridgeManager {
    adapters: HashMap<String, Arc<dyn BridgeAdapter>>,
    preferred: BTreeMap<ChainId, String>,
}

impl BridgeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its protocol name.
    pub fn register(&mut self, adapter: Arc<dyn BridgeAdapter>) -> Result<(), VaultError> {
        let protocol = adapter.protocol_name().to_string();
        if self.adapters.contains_key(&protocol) {
            return Err(VaultError::DuplicateProtocol(protocol));
        }
        info!(
            "Registered bridge protocol '{}' (chains: {:?})",
            protocol,
            adapter.supported_chains()
        );
        self.adapters.insert(protocol, adapter);
        Ok(())
    }

    /// Sets the protocol used for messages to `chain`.
    ///
    /// The protocol must already be registered and must support `chain`.
    pub fn set_preferred(&mut self, chain: ChainId, protocol: &str) -> Result<(), VaultError> {
        let adapter = self
            .adapters
            .get(protocol)
            .ok_or_else(|| VaultError::UnregisteredProtocol(protocol.to_string()))?;
        if !adapter.supports(chain) {
            return Err(VaultError::UnsupportedChain {
                protocol: protocol.to_string(),
                chain,
            });
        }
        info!("Preferred protocol for {} set to '{}'", chain, protocol);
        self.preferred.insert(chain, protocol.to_string());
        Ok(())
    }

    pub fn preferred_protocol(&self, chain: ChainId) -> Option<&str> {
        self.preferred.get(&chain).map(String::as_str)
    }

    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up the adapter for `chain`, applying both route checks.
    pub fn resolve(&self, chain: ChainId) -> Result<&Arc<dyn BridgeAdapter>, VaultError> {
        let protocol = self
            .preferred
            .get(&chain)
            .ok_or(VaultError::NoPreferredProtocol(chain))?;
        let adapter = self
            .adapters
            .get(protocol)
            .ok_or_else(|| VaultError::UnregisteredProtocol(protocol.clone()))?;
        if !adapter.supports(chain) {
            return Err(VaultError::UnsupportedChain {
                protocol: protocol.clone(),
                chain,
            });
        }
        Ok(adapter)
    }

    pub fn estimate_fee(&self, chain: ChainId, payload: &[u8]) -> Result<Amount, VaultError> {
        let adapter = self.resolve(chain)?;
        Ok(adapter.estimate_fee(chain, payload)?)
    }

    /// Sends `payload` through the preferred adapter for `chain`.
    ///
    /// Adapter rejections are returned as-is and never retried here.
    pub fn dispatch(
        &self,
        chain: ChainId,
        dest_addr: &str,
        payload: &[u8],
        fee: Amount,
    ) -> Result<DeliveryReceipt, VaultError> {
        let adapter = self.resolve(chain)?;
        let protocol = adapter.protocol_name().to_string();

        match adapter.send(chain, dest_addr, payload, fee) {
            Ok(delivery_id) => {
                info!(
                    "Dispatched {} bytes to {} via '{}' (delivery {})",
                    payload.len(),
                    chain,
                    protocol,
                    delivery_id
                );
                Ok(DeliveryReceipt {
                    protocol,
                    delivery_id,
                })
            }
            Err(e) => {
                warn!("Adapter '{}' rejected delivery to {}: {}", protocol, chain, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{AdapterError, FeeModel, LoopbackAdapter, Mailbox};
    use crate::chains::ChainNameTable;

    fn loopback(protocol: &str, chains: &[ChainId]) -> Arc<LoopbackAdapter> {
        Arc::new(LoopbackAdapter::new(
            ChainId::Ethereum,
            ChainNameTable::canonical(protocol, chains.iter().copied()).unwrap(),
            FeeModel::default(),
            Mailbox::default(),
        ))
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut manager = BridgeManager::new();
        manager.register(loopback("lz", &[ChainId::Base])).unwrap();
        assert_eq!(
            manager.register(loopback("lz", &[ChainId::Base])),
            Err(VaultError::DuplicateProtocol("lz".to_string()))
        );
    }

    #[test]
    fn test_set_preferred_requires_registration() {
        let mut manager = BridgeManager::new();
        assert_eq!(
            manager.set_preferred(ChainId::Base, "lz"),
            Err(VaultError::UnregisteredProtocol("lz".to_string()))
        );
    }

    #[test]
    fn test_dispatch_without_preference_fails_closed() {
        let mut manager = BridgeManager::new();
        manager.register(loopback("lz", &[ChainId::Base])).unwrap();
        let err = manager.dispatch(ChainId::Base, "0x01", b"x", 0).unwrap_err();
        assert_eq!(err, VaultError::NoPreferredProtocol(ChainId::Base));
    }

    #[test]
    fn test_dispatch_surfaces_adapter_rejection() {
        let mut manager = BridgeManager::new();
        let adapter = loopback("lz", &[ChainId::Base]);
        manager.register(adapter.clone()).unwrap();
        manager.set_preferred(ChainId::Base, "lz").unwrap();

        adapter.set_rejecting(true);
        let err = manager.dispatch(ChainId::Base, "0x01", b"x", 0).unwrap_err();
        assert!(matches!(err, VaultError::Delivery(AdapterError::Rejected(_))));
    }
}
