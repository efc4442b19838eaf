//! Bridge Adapter Abstraction
//!
//! An adapter is a pure delivery mechanism: it moves an opaque payload to a
//! destination chain/address and quotes the cost of doing so. It knows
//! nothing about what the payload means. The [`BridgeManager`] is the single
//! entry point the rest of the crate uses to send messages.

pub mod http_relay;
pub mod loopback;
pub mod manager;

use thiserror::Error;

use crate::chains::ChainId;
use crate::types::Amount;

pub use http_relay::HttpRelayAdapter;
pub use loopback::{Delivery, FeeModel, LoopbackAdapter, Mailbox};
pub use manager::{BridgeManager, DeliveryReceipt};

/// Identifier an adapter assigns to an accepted delivery.
pub type DeliveryId = String;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Adapter does not support chain {0}")]
    UnsupportedChain(ChainId),

    #[error("Fee {provided} is below the adapter quote {required}")]
    FeeTooLow { provided: Amount, required: Amount },

    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// One delivery mechanism (GMP endpoint, relay service, ...).
pub trait BridgeAdapter: Send + Sync {
    /// Name the adapter is registered under.
    fn protocol_name(&self) -> &str;

    /// Chains this adapter can deliver to.
    fn supported_chains(&self) -> Vec<ChainId>;

    fn supports(&self, chain: ChainId) -> bool {
        self.supported_chains().contains(&chain)
    }

    /// Quotes the fee for delivering `payload` to `dest_chain`.
    fn estimate_fee(&self, dest_chain: ChainId, payload: &[u8]) -> Result<Amount, AdapterError>;

    /// Hands `payload` to the delivery mechanism.
    ///
    /// Returning `Ok` means the mechanism accepted the message; it says
    /// nothing about whether the destination will ever apply it.
    fn send(
        &self,
        dest_chain: ChainId,
        dest_addr: &str,
        payload: &[u8],
        fee: Amount,
    ) -> Result<DeliveryId, AdapterError>;
}
