//! Logical chain identifiers and per-protocol chain naming.
//!
//! Every bridge protocol names chains differently ("ethereum",
//! "ethereum-sepolia", a numeric endpoint id, ...). The rest of the crate only
//! speaks [`ChainId`]; each adapter carries a [`ChainNameTable`] that is
//! validated when the adapter is configured, never inferred at call time.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;

/// Closed set of chains a vault can be deployed on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
    Polygon,
    Avalanche,
    Bsc,
}

impl ChainId {
    pub const ALL: [ChainId; 7] = [
        ChainId::Ethereum,
        ChainId::Arbitrum,
        ChainId::Optimism,
        ChainId::Base,
        ChainId::Polygon,
        ChainId::Avalanche,
        ChainId::Bsc,
    ];

    /// Canonical lowercase name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Optimism => "optimism",
            ChainId::Base => "base",
            ChainId::Polygon => "polygon",
            ChainId::Avalanche => "avalanche",
            ChainId::Bsc => "bsc",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainId::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| VaultError::InvalidConfiguration(format!("Unknown chain '{}'", s)))
    }
}

/// Translation of logical chains to one protocol's own chain names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNameTable {
    protocol: String,
    names: BTreeMap<ChainId, String>,
}

impl ChainNameTable {
    /// Builds a table for `protocol`, rejecting empty tables, empty names and
    /// two logical chains sharing one protocol name.
    pub fn new(
        protocol: impl Into<String>,
        entries: impl IntoIterator<Item = (ChainId, String)>,
    ) -> Result<Self, VaultError> {
        let protocol = protocol.into();
        let mut names = BTreeMap::new();

        for (chain, name) in entries {
            if name.trim().is_empty() {
                return Err(VaultError::InvalidConfiguration(format!(
                    "Protocol '{}' maps chain {} to an empty name",
                    protocol, chain
                )));
            }
            if let Some((other, _)) = names.iter().find(|(_, n)| **n == name) {
                return Err(VaultError::InvalidConfiguration(format!(
                    "Protocol '{}' maps both {} and {} to '{}'",
                    protocol, other, chain, name
                )));
            }
            if names.insert(chain, name).is_some() {
                return Err(VaultError::InvalidConfiguration(format!(
                    "Protocol '{}' maps chain {} twice",
                    protocol, chain
                )));
            }
        }

        if names.is_empty() {
            return Err(VaultError::InvalidConfiguration(format!(
                "Protocol '{}' has no chain mappings",
                protocol
            )));
        }

        Ok(Self { protocol, names })
    }

    /// Identity table: each chain uses its canonical name.
    pub fn canonical(
        protocol: impl Into<String>,
        chains: impl IntoIterator<Item = ChainId>,
    ) -> Result<Self, VaultError> {
        Self::new(
            protocol,
            chains.into_iter().map(|c| (c, c.as_str().to_string())),
        )
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn name_for(&self, chain: ChainId) -> Option<&str> {
        self.names.get(&chain).map(String::as_str)
    }

    pub fn chain_for(&self, name: &str) -> Option<ChainId> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(c, _)| *c)
    }

    pub fn contains(&self, chain: ChainId) -> bool {
        self.names.contains_key(&chain)
    }

    pub fn chains(&self) -> Vec<ChainId> {
        self.names.keys().copied().collect()
    }
}
