//! Liquidity sources the router can quote.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::Amount;

/// Origin of borrowable funds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquiditySource {
    /// This chain's pool
    Local,
    /// Reserves bridged from remote vaults
    CrossChain,
    /// Third-party money market, by adapter name
    External(String),
}

impl LiquiditySource {
    pub fn kind(&self) -> SourceKind {
        match self {
            LiquiditySource::Local => SourceKind::Local,
            LiquiditySource::CrossChain => SourceKind::CrossChain,
            LiquiditySource::External(_) => SourceKind::External,
        }
    }
}

impl fmt::Display for LiquiditySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquiditySource::Local => write!(f, "local"),
            LiquiditySource::CrossChain => write!(f, "cross-chain"),
            LiquiditySource::External(name) => write!(f, "external:{}", name),
        }
    }
}

/// Source category used to enable or disable sources per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    CrossChain,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityQuote {
    pub source: LiquiditySource,
    pub available_amount: Amount,
    pub fee_bps: u64,
    pub estimated_time_seconds: u64,
    pub rate_apy_bps: u64,
}

impl LiquidityQuote {
    /// Same quote with nothing available.
    pub fn unavailable(mut self) -> Self {
        self.available_amount = 0;
        self
    }
}

// ============================================================================
// EXTERNAL MARKETS
// ============================================================================

/// Wrapper around a third-party money market.
pub trait ExternalLiquidityAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supports_token(&self, asset: &str) -> bool;

    fn get_available_liquidity(&self, asset: &str) -> Amount;

    /// Current borrow APY in bps.
    fn get_current_apy(&self, asset: &str) -> u64;

    fn get_quote(&self, asset: &str, amount: Amount) -> LiquidityQuote;
}

/// Terms of one asset in a [`StaticMarketAdapter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTerms {
    pub available: Amount,
    pub apy_bps: u64,
    pub fee_bps: u64,
    pub estimated_time_seconds: u64,
}

/// Money market with operator-configured terms.
#[derive(Debug, Clone)]
pub struct StaticMarketAdapter {
    name: String,
    markets: HashMap<String, MarketTerms>,
}

impl StaticMarketAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markets: HashMap::new(),
        }
    }

    pub fn with_market(mut self, asset: &str, terms: MarketTerms) -> Self {
        self.add_market(asset, terms);
        self
    }

    pub fn add_market(&mut self, asset: &str, terms: MarketTerms) {
        self.markets.insert(asset.to_string(), terms);
    }
}

impl ExternalLiquidityAdapter for StaticMarketAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_token(&self, asset: &str) -> bool {
        self.markets.contains_key(asset)
    }

    fn get_available_liquidity(&self, asset: &str) -> Amount {
        self.markets.get(asset).map(|m| m.available).unwrap_or(0)
    }

    fn get_current_apy(&self, asset: &str) -> u64 {
        self.markets.get(asset).map(|m| m.apy_bps).unwrap_or(0)
    }

    fn get_quote(&self, asset: &str, _amount: Amount) -> LiquidityQuote {
        let terms = self.markets.get(asset).copied().unwrap_or_default();
        LiquidityQuote {
            source: LiquiditySource::External(self.name.clone()),
            available_amount: terms.available,
            fee_bps: terms.fee_bps,
            estimated_time_seconds: terms.estimated_time_seconds,
            rate_apy_bps: terms.apy_bps,
        }
    }
}

// ============================================================================
// REMOTE RESERVES
// ============================================================================

/// Availability of reserves on remote vaults, delivered over a bridge.
pub trait RemoteReserveProvider: Send + Sync {
    fn remote_quote(&self, asset: &str, amount: Amount) -> LiquidityQuote;
}

/// Remote reserves with operator-configured bridge terms.
#[derive(Debug, Clone, Default)]
pub struct StaticRemoteReserves {
    available: HashMap<String, Amount>,
    pub fee_bps: u64,
    pub estimated_time_seconds: u64,
    pub rate_apy_bps: u64,
}

impl StaticRemoteReserves {
    pub fn new(fee_bps: u64, estimated_time_seconds: u64, rate_apy_bps: u64) -> Self {
        Self {
            available: HashMap::new(),
            fee_bps,
            estimated_time_seconds,
            rate_apy_bps,
        }
    }

    pub fn set_available(&mut self, asset: &str, amount: Amount) {
        self.available.insert(asset.to_string(), amount);
    }
}

impl RemoteReserveProvider for StaticRemoteReserves {
    fn remote_quote(&self, asset: &str, _amount: Amount) -> LiquidityQuote {
        LiquidityQuote {
            source: LiquiditySource::CrossChain,
            available_amount: self.available.get(asset).copied().unwrap_or(0),
            fee_bps: self.fee_bps,
            estimated_time_seconds: self.estimated_time_seconds,
            rate_apy_bps: self.rate_apy_bps,
        }
    }
}
