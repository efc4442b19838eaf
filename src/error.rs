//! Error definitions for the cross-chain vault.

use thiserror::Error;

use crate::bridge::AdapterError;
use crate::chains::ChainId;
use crate::ledger::LedgerError;
use crate::types::Amount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("No trusted vault configured for chain {0}")]
    UntrustedDestination(ChainId),

    #[error("No preferred bridge protocol configured for chain {0}")]
    NoPreferredProtocol(ChainId),

    #[error("Bridge protocol '{0}' is not registered")]
    UnregisteredProtocol(String),

    #[error("Bridge protocol '{0}' is already registered")]
    DuplicateProtocol(String),

    #[error("Bridge protocol '{protocol}' does not support chain {chain}")]
    UnsupportedChain { protocol: String, chain: ChainId },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid vault address: {0}")]
    InvalidAddress(String),

    #[error("Fee {provided} is below the minimum floor {floor}")]
    InsufficientFee { provided: Amount, floor: Amount },

    #[error("Fee balance {available} cannot cover fee {required}")]
    InsufficientFeeBalance { available: Amount, required: Amount },

    #[error("Untrusted sender {vault} for chain {chain}")]
    UntrustedSender { chain: ChainId, vault: String },

    #[error("Envelope addressed to {vault} on {chain} is not for this vault")]
    MisaddressedEnvelope { chain: ChainId, vault: String },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Failed to persist outbound messages: {0}")]
    Persistence(String),

    #[error("Bridge delivery failed: {0}")]
    Delivery(#[from] AdapterError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VaultError {
    /// Configuration errors fail closed and never leave partial effects.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VaultError::UntrustedDestination(_)
                | VaultError::NoPreferredProtocol(_)
                | VaultError::UnregisteredProtocol(_)
                | VaultError::DuplicateProtocol(_)
                | VaultError::UnsupportedChain { .. }
                | VaultError::InvalidConfiguration(_)
                | VaultError::InvalidAddress(_)
        )
    }
}
