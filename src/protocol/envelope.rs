//! Envelope wire format.
//!
//! An envelope is Borsh-encoded on the wire. Its message id is the
//! Keccak-256 hash of every other field (including the per-destination
//! nonce), so a transport-level duplicate carries the same id while a fresh
//! notification of an identical ledger event does not.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::chains::ChainId;
use crate::error::VaultError;
use crate::ledger::LedgerAction;
use crate::types::Amount;

/// Ledger mutation carried by an envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum SyncAction {
    SyncDeposit,
    SyncWithdraw,
    SyncBorrow,
    SyncRepay,
    /// Re-assertion of the sender's current balances to one chain
    ManualSync,
    /// Re-assertion of the sender's current balances fanned out to all peers
    Reconcile,
}

impl SyncAction {
    pub fn from_ledger(action: LedgerAction) -> Self {
        match action {
            LedgerAction::Deposit => SyncAction::SyncDeposit,
            LedgerAction::Withdraw => SyncAction::SyncWithdraw,
            LedgerAction::Borrow => SyncAction::SyncBorrow,
            LedgerAction::Repay => SyncAction::SyncRepay,
        }
    }

    /// Ledger delta for additive actions, `None` for snapshots.
    pub fn as_delta(&self) -> Option<LedgerAction> {
        match self {
            SyncAction::SyncDeposit => Some(LedgerAction::Deposit),
            SyncAction::SyncWithdraw => Some(LedgerAction::Withdraw),
            SyncAction::SyncBorrow => Some(LedgerAction::Borrow),
            SyncAction::SyncRepay => Some(LedgerAction::Repay),
            SyncAction::ManualSync | SyncAction::Reconcile => None,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.as_delta().is_none()
    }
}

/// Keccak-256 message identifier.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct MessageId(#[serde(with = "hex::serde")] pub [u8; 32]);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self)
    }
}

/// Unit of cross-chain communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Envelope {
    pub source_chain: ChainId,
    pub source_vault: String,
    pub destination_chain: ChainId,
    pub destination_vault: String,
    pub action: SyncAction,
    pub user: String,
    /// Delta amount, or absolute collateral for snapshot actions
    pub amount: Amount,
    /// Absolute borrowed balance for snapshot actions, zero otherwise
    pub borrowed: Amount,
    /// Per-destination outbound sequence number
    pub nonce: u64,
    pub message_id: MessageId,
}

impl Envelope {
    /// Builds an envelope and derives its message id.
    #[allow(clippy::too_many_arguments)]
    pub fn compose(
        source_chain: ChainId,
        source_vault: &str,
        destination_chain: ChainId,
        destination_vault: &str,
        action: SyncAction,
        user: &str,
        amount: Amount,
        borrowed: Amount,
        nonce: u64,
    ) -> Result<Self, VaultError> {
        let mut envelope = Self {
            source_chain,
            source_vault: source_vault.to_string(),
            destination_chain,
            destination_vault: destination_vault.to_string(),
            action,
            user: user.to_string(),
            amount,
            borrowed,
            nonce,
            message_id: MessageId([0u8; 32]),
        };
        envelope.message_id = envelope.compute_id()?;
        Ok(envelope)
    }

    /// Hashes all content fields in declaration order.
    pub fn compute_id(&self) -> Result<MessageId, VaultError> {
        let mut buf = Vec::with_capacity(160);
        (|| -> std::io::Result<()> {
            BorshSerialize::serialize(&self.source_chain, &mut buf)?;
            BorshSerialize::serialize(&self.source_vault, &mut buf)?;
            BorshSerialize::serialize(&self.destination_chain, &mut buf)?;
            BorshSerialize::serialize(&self.destination_vault, &mut buf)?;
            BorshSerialize::serialize(&self.action, &mut buf)?;
            BorshSerialize::serialize(&self.user, &mut buf)?;
            BorshSerialize::serialize(&self.amount, &mut buf)?;
            BorshSerialize::serialize(&self.borrowed, &mut buf)?;
            BorshSerialize::serialize(&self.nonce, &mut buf)
        })()
        .map_err(|e| VaultError::MalformedEnvelope(e.to_string()))?;

        let digest = Keccak256::digest(&buf);
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Ok(MessageId(id))
    }

    pub fn has_valid_id(&self) -> bool {
        matches!(self.compute_id(), Ok(id) if id == self.message_id)
    }

    pub fn encode(&self) -> Result<Vec<u8>, VaultError> {
        self.try_to_vec()
            .map_err(|e| VaultError::MalformedEnvelope(e.to_string()))
    }

    /// Decodes an envelope and checks that its id matches its content.
    pub fn decode(bytes: &[u8]) -> Result<Self, VaultError> {
        let envelope = Self::try_from_slice(bytes)
            .map_err(|e| VaultError::MalformedEnvelope(e.to_string()))?;
        if !envelope.has_valid_id() {
            return Err(VaultError::MalformedEnvelope(format!(
                "message id {} does not match content",
                envelope.message_id
            )));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT_ETH: &str = "0x00000000000000000000000000000000000000e1";
    const VAULT_BASE: &str = "0x00000000000000000000000000000000000000b1";
    const USER: &str = "0x0000000000000000000000000000000000000001";

    fn envelope(nonce: u64) -> Envelope {
        Envelope::compose(
            ChainId::Ethereum,
            VAULT_ETH,
            ChainId::Base,
            VAULT_BASE,
            SyncAction::SyncDeposit,
            USER,
            500,
            0,
            nonce,
        )
        .unwrap()
    }

    #[test]
    fn test_same_content_same_id() {
        assert_eq!(envelope(1).message_id, envelope(1).message_id);
    }

    #[test]
    fn test_nonce_distinguishes_identical_events() {
        assert_ne!(envelope(1).message_id, envelope(2).message_id);
    }

    #[test]
    fn test_decode_rejects_tampered_amount() {
        let mut tampered = envelope(1);
        tampered.amount = 5_000;
        let bytes = tampered.encode().unwrap();
        assert!(matches!(
            Envelope::decode(&bytes),
            Err(VaultError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Envelope::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_snapshot_actions_have_no_delta() {
        assert!(SyncAction::ManualSync.is_snapshot());
        assert!(SyncAction::Reconcile.is_snapshot());
        assert_eq!(
            SyncAction::from_ledger(LedgerAction::Repay).as_delta(),
            Some(LedgerAction::Repay)
        );
    }
}
