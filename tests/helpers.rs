//! Shared test helpers for credit vault tests
//!
//! This module provides constants and a small in-process network of vaults
//! wired together through loopback adapters.

#![allow(dead_code)]

use credit_vault::bridge::{FeeModel, LoopbackAdapter, Mailbox};
use credit_vault::chains::{ChainId, ChainNameTable};
use credit_vault::error::VaultError;
use credit_vault::protocol::{CrossChainVault, Envelope, ReceiveOutcome};
use credit_vault::types::Amount;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- VAULTS --------------------------------

/// Dummy vault address on Ethereum (EVM format, 40 hex characters)
pub const DUMMY_VAULT_ETHEREUM: &str = "0x00000000000000000000000000000000000000e1";

/// Dummy vault address on Arbitrum (EVM format, 40 hex characters)
pub const DUMMY_VAULT_ARBITRUM: &str = "0x00000000000000000000000000000000000000a1";

/// Dummy vault address on Base (EVM format, 40 hex characters)
pub const DUMMY_VAULT_BASE: &str = "0x00000000000000000000000000000000000000b1";

/// Dummy vault address nobody trusts (EVM format, 40 hex characters)
pub const DUMMY_VAULT_ROGUE: &str = "0x00000000000000000000000000000000000000ff";

// -------------------------------- USERS ---------------------------------

/// Dummy user address (EVM format, 40 hex characters)
pub const DUMMY_USER: &str = "0x0000000000000000000000000000000000000001";

/// Second dummy user address (EVM format, 40 hex characters)
pub const DUMMY_USER_2: &str = "0x0000000000000000000000000000000000000002";

// -------------------------------- PARAMS --------------------------------

/// Loan-to-value ratio used by test vaults (75%)
pub const TEST_COLLATERAL_RATIO_BPS: u128 = 7_500;

/// Minimum bridge fee used by test vaults
pub const TEST_MIN_FEE_FLOOR: Amount = 10;

/// Flat loopback fee per message
pub const TEST_BASE_FEE: Amount = 10;

/// Loopback protocol name
pub const TEST_PROTOCOL: &str = "loopback";

/// Fee balance pre-funded for the test user on every vault
pub const TEST_FEE_FUNDING: Amount = 1_000;

/// Clock value handed to outbox drains
pub const NOW_MS: u64 = 1_000_000;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Vault address used for `chain` in the test network.
pub fn vault_address(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Ethereum => DUMMY_VAULT_ETHEREUM,
        ChainId::Arbitrum => DUMMY_VAULT_ARBITRUM,
        ChainId::Base => DUMMY_VAULT_BASE,
        _ => "0x00000000000000000000000000000000000000c1",
    }
}

/// Loopback name table covering `chains`.
pub fn loopback_names(chains: &[ChainId]) -> ChainNameTable {
    ChainNameTable::canonical(TEST_PROTOCOL, chains.iter().copied()).unwrap()
}

/// Fully meshed vaults on `chains`, delivering through one shared mailbox.
pub struct TestNetwork {
    pub vaults: BTreeMap<ChainId, CrossChainVault>,
    pub adapters: BTreeMap<ChainId, Arc<LoopbackAdapter>>,
    pub mailbox: Mailbox,
}

impl TestNetwork {
    /// Every vault trusts and peers with every other one, uses the loopback
    /// protocol for all routes and has [`TEST_FEE_FUNDING`] for [`DUMMY_USER`].
    pub fn new(chains: &[ChainId]) -> Self {
        let mailbox = Mailbox::new();
        let mut vaults = BTreeMap::new();
        let mut adapters = BTreeMap::new();

        for &chain in chains {
            let mut vault = CrossChainVault::new(
                chain,
                vault_address(chain),
                TEST_COLLATERAL_RATIO_BPS,
                TEST_MIN_FEE_FLOOR,
            )
            .unwrap();
            let adapter = Arc::new(LoopbackAdapter::new(
                chain,
                loopback_names(chains),
                FeeModel {
                    base_fee: TEST_BASE_FEE,
                    fee_per_byte: 0,
                },
                mailbox.clone(),
            ));
            vault.register_adapter(adapter.clone()).unwrap();

            for &remote in chains.iter().filter(|c| **c != chain) {
                vault.set_trusted_vault(remote, vault_address(remote)).unwrap();
                vault.add_peer(remote).unwrap();
                vault.set_preferred_protocol(remote, TEST_PROTOCOL).unwrap();
            }
            vault.fund_fees(DUMMY_USER, TEST_FEE_FUNDING);

            vaults.insert(chain, vault);
            adapters.insert(chain, adapter);
        }

        Self {
            vaults,
            adapters,
            mailbox,
        }
    }

    pub fn vault(&mut self, chain: ChainId) -> &mut CrossChainVault {
        self.vaults.get_mut(&chain).unwrap()
    }

    /// Drains every outbox once. Returns the number of envelopes dispatched.
    pub fn dispatch_all(&mut self) -> usize {
        self.vaults
            .values_mut()
            .map(|vault| vault.dispatch_pending(NOW_MS).dispatched)
            .sum()
    }

    /// Delivers everything in the mailbox to its destination vault.
    pub fn relay(&mut self) -> Vec<(Envelope, Result<ReceiveOutcome, VaultError>)> {
        let mut results = Vec::new();
        for delivery in self.mailbox.drain() {
            let envelope = Envelope::decode(&delivery.payload).unwrap();
            let outcome = self.vault(delivery.dest_chain).receive(&envelope);
            results.push((envelope, outcome));
        }
        results
    }

    /// One dispatch pass followed by one relay pass.
    pub fn sync(&mut self) -> Vec<(Envelope, Result<ReceiveOutcome, VaultError>)> {
        self.dispatch_all();
        self.relay()
    }
}
