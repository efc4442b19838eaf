//! Price oracle interface.
//!
//! Prices use 8 decimals; USD values use 18 decimals. Readings older than
//! the oracle's maximum age, or not strictly positive, are rejected.

use std::collections::HashMap;
use thiserror::Error;

use crate::types::Amount;

/// Decimals of a price reading.
pub const PRICE_DECIMALS: u32 = 8;
/// Decimals of a USD value.
pub const USD_DECIMALS: u32 = 18;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Price for {asset} is stale: updated at {updated_at}, now {now}, max age {max_age}s")]
    StalePrice {
        asset: String,
        updated_at: u64,
        now: u64,
        max_age: u64,
    },

    #[error("Price for {0} is not positive")]
    NonPositivePrice(String),

    #[error("No price feed for {0}")]
    UnknownAsset(String),

    #[error("USD conversion overflowed")]
    Overflow,
}

/// A price reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceData {
    /// Price in USD with 8 decimals
    pub price: i128,
    /// Unix seconds of the last update
    pub updated_at: u64,
}

impl PriceData {
    pub fn is_stale(&self, now: u64, max_age: u64) -> bool {
        now.saturating_sub(self.updated_at) > max_age
    }
}

pub trait PriceOracle: Send + Sync {
    /// Price of the chain's native asset (8 decimals).
    fn native_price(&self, now: u64) -> Result<u128, OracleError>;

    /// Price of `asset` (8 decimals).
    fn token_price(&self, asset: &str, now: u64) -> Result<u128, OracleError>;

    /// Value of `amount` native units (18 decimals) in USD (18 decimals).
    fn convert_to_usd(&self, amount: Amount, now: u64) -> Result<u128, OracleError> {
        let price = self.native_price(now)?;
        amount
            .checked_mul(price)
            .map(|v| v / 10u128.pow(PRICE_DECIMALS))
            .ok_or(OracleError::Overflow)
    }
}

/// Oracle over operator-set readings.
#[derive(Debug, Clone)]
pub struct FixedPriceOracle {
    native_asset: String,
    max_age_secs: u64,
    prices: HashMap<String, PriceData>,
}

impl FixedPriceOracle {
    pub fn new(native_asset: impl Into<String>, max_age_secs: u64) -> Self {
        Self {
            native_asset: native_asset.into(),
            max_age_secs,
            prices: HashMap::new(),
        }
    }

    pub fn set_price(&mut self, asset: &str, price: i128, updated_at: u64) {
        self.prices
            .insert(asset.to_string(), PriceData { price, updated_at });
    }

    fn checked(&self, asset: &str, now: u64) -> Result<u128, OracleError> {
        let data = self
            .prices
            .get(asset)
            .ok_or_else(|| OracleError::UnknownAsset(asset.to_string()))?;
        if data.price <= 0 {
            return Err(OracleError::NonPositivePrice(asset.to_string()));
        }
        if data.is_stale(now, self.max_age_secs) {
            return Err(OracleError::StalePrice {
                asset: asset.to_string(),
                updated_at: data.updated_at,
                now,
                max_age: self.max_age_secs,
            });
        }
        Ok(data.price as u128)
    }
}

impl PriceOracle for FixedPriceOracle {
    fn native_price(&self, now: u64) -> Result<u128, OracleError> {
        self.checked(&self.native_asset, now)
    }

    fn token_price(&self, asset: &str, now: u64) -> Result<u128, OracleError> {
        self.checked(asset, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> FixedPriceOracle {
        let mut oracle = FixedPriceOracle::new("ETH", 60);
        oracle.set_price("ETH", 2_000_00000000, 1_000);
        oracle
    }

    #[test]
    fn test_convert_to_usd() {
        // 1.5 ETH at $2000 = $3000
        let usd = oracle().convert_to_usd(1_500_000_000_000_000_000, 1_030).unwrap();
        assert_eq!(usd, 3_000 * 10u128.pow(USD_DECIMALS));
    }

    #[test]
    fn test_stale_price_rejected() {
        let err = oracle().native_price(1_061).unwrap_err();
        assert!(matches!(err, OracleError::StalePrice { .. }));
        assert!(oracle().native_price(1_060).is_ok());
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let mut oracle = oracle();
        oracle.set_price("USDC", 0, 1_000);
        assert_eq!(
            oracle.token_price("USDC", 1_000),
            Err(OracleError::NonPositivePrice("USDC".to_string()))
        );
        assert_eq!(
            oracle.token_price("DAI", 1_000),
            Err(OracleError::UnknownAsset("DAI".to_string()))
        );
    }
}
