//! Liquidity Router
//!
//! Quotes every known liquidity source for a borrow and builds a greedy
//! execution plan across them. Quotes are produced fresh per request.
//!
//! ## Planning
//!
//! Enabled sources are stably sorted by `(fee_bps, estimated_time_seconds)`
//! and filled cheapest first, each step capped by the source's availability.
//! A plan that cannot cover the full amount, or whose weighted fee exceeds
//! the request's cap, is returned with `is_valid = false` and no steps.

pub mod sources;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::ledger::PositionLedger;
use crate::rates::InterestRateModel;
use crate::types::Amount;

pub use sources::{
    ExternalLiquidityAdapter, LiquidityQuote, LiquiditySource, MarketTerms, RemoteReserveProvider,
    SourceKind, StaticMarketAdapter, StaticRemoteReserves,
};

/// Per-user routing opt-ins and caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterPreferences {
    #[serde(default)]
    pub enable_cross_chain: bool,
    #[serde(default)]
    pub enable_external_protocols: bool,
    pub max_fee_bps: u64,
    pub max_wait_seconds: u64,
    pub max_external_apy_bps: u64,
}

impl Default for RouterPreferences {
    fn default() -> Self {
        Self {
            enable_cross_chain: false,
            enable_external_protocols: false,
            max_fee_bps: 100,
            max_wait_seconds: 3_600,
            max_external_apy_bps: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub asset: String,
    pub amount: Amount,
    pub enabled_sources: Vec<SourceKind>,
    /// Cap on the amount-weighted average fee
    pub max_total_fee_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub source: LiquiditySource,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowPlan {
    pub steps: Vec<PlanStep>,
    /// Sum of `fee_bps * step_amount`
    pub total_fee: u128,
    pub max_wait_time: u64,
    pub is_valid: bool,
}

impl BorrowPlan {
    fn infeasible() -> Self {
        Self::default()
    }

    pub fn total_amount(&self) -> Amount {
        self.steps.iter().map(|s| s.amount).sum()
    }
}

pub struct LiquidityRouter {
    /// Asset lent by the local pool
    local_asset: String,
    rate_model: Box<dyn InterestRateModel>,
    remote: Option<Box<dyn RemoteReserveProvider>>,
    external: Vec<Box<dyn ExternalLiquidityAdapter>>,
    default_preferences: RouterPreferences,
    preferences: HashMap<String, RouterPreferences>,
}

impl LiquidityRouter {
    pub fn new(local_asset: impl Into<String>, rate_model: Box<dyn InterestRateModel>) -> Self {
        Self {
            local_asset: local_asset.into(),
            rate_model,
            remote: None,
            external: Vec::new(),
            default_preferences: RouterPreferences::default(),
            preferences: HashMap::new(),
        }
    }

    pub fn with_remote_reserves(mut self, provider: Box<dyn RemoteReserveProvider>) -> Self {
        self.remote = Some(provider);
        self
    }

    /// Adds an external market; quote slots follow registration order.
    pub fn add_external(&mut self, adapter: Box<dyn ExternalLiquidityAdapter>) {
        self.external.push(adapter);
    }

    pub fn set_default_preferences(&mut self, preferences: RouterPreferences) {
        self.default_preferences = preferences;
    }

    pub fn update_preferences(&mut self, user: &str, preferences: RouterPreferences) {
        debug!("Router preferences for {} set to {:?}", user, preferences);
        self.preferences.insert(user.to_string(), preferences);
    }

    pub fn preferences(&self, user: &str) -> RouterPreferences {
        self.preferences
            .get(user)
            .copied()
            .unwrap_or(self.default_preferences)
    }

    /// Quotes every known source for `user`.
    ///
    /// The local slot is always first; the cross-chain slot follows when a
    /// remote provider is configured, then one slot per external market.
    /// Sources the user has not enabled, or that exceed their caps, are
    /// returned with zero availability.
    pub fn get_quotes(
        &self,
        ledger: &PositionLedger,
        user: &str,
        asset: &str,
        amount: Amount,
    ) -> Vec<LiquidityQuote> {
        let prefs = self.preferences(user);
        let mut quotes = Vec::with_capacity(2 + self.external.len());

        let borrowed = ledger.local_borrowed();
        let available = ledger.available_liquidity();
        quotes.push(LiquidityQuote {
            source: LiquiditySource::Local,
            available_amount: if asset == self.local_asset { available } else { 0 },
            fee_bps: 0,
            estimated_time_seconds: 0,
            rate_apy_bps: self
                .rate_model
                .variable_rate(available.saturating_add(borrowed), borrowed),
        });

        if let Some(remote) = &self.remote {
            let quote = remote.remote_quote(asset, amount);
            let allowed = prefs.enable_cross_chain
                && quote.fee_bps <= prefs.max_fee_bps
                && quote.estimated_time_seconds <= prefs.max_wait_seconds;
            quotes.push(if allowed { quote } else { quote.unavailable() });
        }

        // Live liquidity and APY take precedence over the adapter's quoted terms
        for adapter in &self.external {
            let mut quote = adapter.get_quote(asset, amount);
            quote.available_amount = quote
                .available_amount
                .min(adapter.get_available_liquidity(asset));
            quote.rate_apy_bps = quote.rate_apy_bps.max(adapter.get_current_apy(asset));
            let allowed = prefs.enable_external_protocols
                && adapter.supports_token(asset)
                && quote.fee_bps <= prefs.max_fee_bps
                && quote.estimated_time_seconds <= prefs.max_wait_seconds
                && quote.rate_apy_bps <= prefs.max_external_apy_bps;
            quotes.push(if allowed { quote } else { quote.unavailable() });
        }

        quotes
    }

    pub fn generate_borrow_plan(
        &self,
        ledger: &PositionLedger,
        user: &str,
        request: &BorrowRequest,
    ) -> BorrowPlan {
        let quotes = self.get_quotes(ledger, user, &request.asset, request.amount);
        let plan = plan_from_quotes(&quotes, request);
        debug!(
            "Borrow plan for {} of {} {}: valid={} steps={} fee={}",
            user,
            request.amount,
            request.asset,
            plan.is_valid,
            plan.steps.len(),
            plan.total_fee
        );
        plan
    }
}

/// Greedy plan over `quotes`, which must be in source-declaration order.
pub fn plan_from_quotes(quotes: &[LiquidityQuote], request: &BorrowRequest) -> BorrowPlan {
    if request.amount == 0 {
        return BorrowPlan::infeasible();
    }

    let mut candidates: Vec<&LiquidityQuote> = quotes
        .iter()
        .filter(|q| request.enabled_sources.contains(&q.source.kind()) && q.available_amount > 0)
        .collect();

    let total_available: Amount = candidates
        .iter()
        .fold(0, |acc: Amount, q| acc.saturating_add(q.available_amount));
    if total_available < request.amount {
        return BorrowPlan::infeasible();
    }

    // sort_by_key is stable: equal costs keep declaration order
    candidates.sort_by_key(|q| (q.fee_bps, q.estimated_time_seconds));

    let mut plan = BorrowPlan::default();
    let mut remaining = request.amount;
    for quote in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(quote.available_amount);
        remaining -= take;
        plan.total_fee = plan
            .total_fee
            .saturating_add((quote.fee_bps as u128).saturating_mul(take));
        plan.max_wait_time = plan.max_wait_time.max(quote.estimated_time_seconds);
        plan.steps.push(PlanStep {
            source: quote.source.clone(),
            amount: take,
        });
    }

    let fee_cap = (request.max_total_fee_bps as u128).saturating_mul(request.amount);
    if plan.total_fee > fee_cap {
        return BorrowPlan {
            steps: Vec::new(),
            total_fee: plan.total_fee,
            max_wait_time: plan.max_wait_time,
            is_valid: false,
        };
    }

    plan.is_valid = true;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(source: LiquiditySource, available: Amount, fee_bps: u64, time: u64) -> LiquidityQuote {
        LiquidityQuote {
            source,
            available_amount: available,
            fee_bps,
            estimated_time_seconds: time,
            rate_apy_bps: 0,
        }
    }

    fn request(amount: Amount) -> BorrowRequest {
        BorrowRequest {
            asset: "USDC".to_string(),
            amount,
            enabled_sources: vec![SourceKind::Local, SourceKind::CrossChain, SourceKind::External],
            max_total_fee_bps: 50,
        }
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let quotes = vec![
            quote(LiquiditySource::External("a".to_string()), 10, 5, 60),
            quote(LiquiditySource::External("b".to_string()), 10, 5, 60),
        ];
        let plan = plan_from_quotes(&quotes, &request(15));
        assert!(plan.is_valid);
        assert_eq!(plan.steps[0].source, LiquiditySource::External("a".to_string()));
        assert_eq!(plan.steps[0].amount, 10);
        assert_eq!(plan.steps[1].amount, 5);
    }

    #[test]
    fn test_time_breaks_fee_ties() {
        let quotes = vec![
            quote(LiquiditySource::CrossChain, 10, 5, 600),
            quote(LiquiditySource::External("fast".to_string()), 10, 5, 60),
        ];
        let plan = plan_from_quotes(&quotes, &request(5));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].source, LiquiditySource::External("fast".to_string()));
        assert_eq!(plan.max_wait_time, 60);
    }

    #[test]
    fn test_disabled_kind_is_ignored() {
        let quotes = vec![
            quote(LiquiditySource::Local, 5, 0, 0),
            quote(LiquiditySource::CrossChain, 100, 10, 300),
        ];
        let mut req = request(10);
        req.enabled_sources = vec![SourceKind::Local];
        assert!(!plan_from_quotes(&quotes, &req).is_valid);
    }

    #[test]
    fn test_fee_cap_invalidates_plan() {
        let quotes = vec![quote(LiquiditySource::CrossChain, 100, 80, 300)];
        let plan = plan_from_quotes(&quotes, &request(10));
        assert!(!plan.is_valid);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.total_fee, 800);
    }

    #[test]
    fn test_zero_amount_is_invalid() {
        let quotes = vec![quote(LiquiditySource::Local, 5, 0, 0)];
        assert!(!plan_from_quotes(&quotes, &request(0)).is_valid);
    }
}
