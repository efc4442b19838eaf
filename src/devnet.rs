//! Devnet assembly
//!
//! Builds every configured vault in one process, wires their bridge adapters
//! (loopback adapters share one mailbox drained by the relay service), and
//! provides the router and oracle used for reporting.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::bridge::{HttpRelayAdapter, LoopbackAdapter, Mailbox};
use crate::chains::ChainId;
use crate::config::{parse_chain, OracleConfig, ProtocolKind, RouterConfig, VaultConfig, VaultEntryConfig};
use crate::ledger::LedgerAction;
use crate::oracle::{FixedPriceOracle, PriceOracle, PRICE_DECIMALS};
use crate::outbox::{InMemoryOutboxStore, JsonFileOutboxStore, Outbox, OutboxStore};
use crate::protocol::{
    CrossChainVault, InMemoryProcessedRegistry, InMemoryTrustRegistry, InMemoryWatermarkRegistry,
};
use crate::rates::KinkedRateModel;
use crate::router::{
    BorrowRequest, ExternalLiquidityAdapter, LiquidityRouter, SourceKind, StaticMarketAdapter,
    StaticRemoteReserves,
};
use crate::service::{share, OutboxDispatcher, RelayReport, RelayService, SharedVault};
use crate::types::{unix_millis, Amount};

pub struct Devnet {
    pub vaults: BTreeMap<ChainId, SharedVault>,
    pub mailbox: Mailbox,
    pub router: LiquidityRouter,
    pub oracle: FixedPriceOracle,
    local_asset: String,
}

impl Devnet {
    /// Builds all vaults, adapters, router and oracle from `config`.
    pub fn build(config: &VaultConfig) -> Result<Self> {
        config.validate()?;

        let mailbox = Mailbox::new();
        let mut vaults = BTreeMap::new();
        for entry in &config.vault {
            let vault = build_vault(config, entry, &mailbox)?;
            vaults.insert(vault.chain(), share(vault));
        }

        Ok(Self {
            vaults,
            mailbox,
            router: build_router(&config.router),
            oracle: build_oracle(&config.oracle, unix_millis() / 1_000),
            local_asset: config.router.local_asset.clone(),
        })
    }

    pub fn vault(&self, chain: ChainId) -> Option<&SharedVault> {
        self.vaults.get(&chain)
    }

    pub fn dispatchers(&self, interval: Duration) -> Vec<OutboxDispatcher> {
        self.vaults
            .values()
            .map(|vault| OutboxDispatcher::new(vault.clone(), interval))
            .collect()
    }

    pub fn relay(&self, interval: Duration) -> RelayService {
        RelayService::new(self.mailbox.clone(), self.vaults.clone(), interval)
    }

    /// One dispatch pass over every vault followed by one relay pass.
    ///
    /// # Returns
    ///
    /// * `Ok((usize, RelayReport))` - Envelopes dispatched and relay outcomes
    pub async fn step(&self) -> Result<(usize, RelayReport)> {
        let mut dispatched = 0;
        for dispatcher in self.dispatchers(Duration::ZERO) {
            dispatched += dispatcher.tick().await?.dispatched;
        }
        let report = self.relay(Duration::ZERO).tick().await?;
        Ok((dispatched, report))
    }

    /// Executes the configured demo actions, funding each fee first and
    /// running one dispatch/relay round after each so later actions see the
    /// synced positions.
    pub async fn run_demo_actions(&self, config: &VaultConfig) -> Result<()> {
        for action in &config.demo_action {
            let chain = parse_chain(&action.chain)?;
            let vault = self
                .vault(chain)
                .with_context(|| format!("No vault on {}", chain))?
                .clone();
            let demo = action.clone();

            let result = tokio::task::spawn_blocking(move || {
                let mut vault = vault.blocking_write();
                let (amount, fee) = (Amount::from(demo.amount), Amount::from(demo.fee));
                vault.fund_fees(&demo.user, fee);
                match demo.action {
                    LedgerAction::Deposit => vault.deposit(&demo.user, amount, fee),
                    LedgerAction::Withdraw => vault.withdraw(&demo.user, amount, fee),
                    LedgerAction::Borrow => vault.borrow(&demo.user, amount, fee),
                    LedgerAction::Repay => vault.repay(&demo.user, amount, fee),
                }
            })
            .await
            .context("Demo action task panicked")?;

            match result {
                Ok(receipt) => info!(
                    "Demo {:?} of {} for {} on {}: {} envelope(s) queued",
                    action.action,
                    action.amount,
                    action.user,
                    chain,
                    receipt.message_ids.len()
                ),
                Err(e) => warn!(
                    "Demo {:?} of {} for {} on {} failed: {}",
                    action.action, action.amount, action.user, chain, e
                ),
            }
            self.step().await?;
        }
        Ok(())
    }

    /// Logs every user's position on every chain, with USD value and the
    /// borrow plan for the user's remaining credit.
    pub async fn log_summaries(&self) {
        let now = unix_millis() / 1_000;
        let price = self.oracle.token_price(&self.local_asset, now);

        for (chain, vault) in &self.vaults {
            let vault = vault.read().await;
            for user in vault.ledger().users() {
                let summary = vault.summary(&user);
                let value = match &price {
                    Ok(p) => format!(
                        "${}",
                        summary.total_collateral.saturating_mul(*p) / 10u128.pow(PRICE_DECIMALS)
                    ),
                    Err(e) => format!("unpriced ({})", e),
                };
                info!(
                    "[{}] {} collateral={} ({}) borrowed={} credit_line={} available={} health={:?}",
                    chain,
                    user,
                    summary.total_collateral,
                    value,
                    summary.total_borrowed,
                    summary.credit_line,
                    summary.available_credit,
                    summary.health_ratio_bps
                );

                if summary.available_credit > 0 {
                    let prefs = self.router.preferences(&user);
                    let plan = self.router.generate_borrow_plan(
                        vault.ledger(),
                        &user,
                        &BorrowRequest {
                            asset: self.local_asset.clone(),
                            amount: summary.available_credit,
                            enabled_sources: vec![
                                SourceKind::Local,
                                SourceKind::CrossChain,
                                SourceKind::External,
                            ],
                            max_total_fee_bps: prefs.max_fee_bps,
                        },
                    );
                    info!(
                        "[{}] {} borrow plan for {}: valid={} steps={:?} total_fee={} max_wait={}s",
                        chain,
                        user,
                        summary.available_credit,
                        plan.is_valid,
                        plan.steps,
                        plan.total_fee,
                        plan.max_wait_time
                    );
                }
            }
        }
    }
}

fn build_vault(config: &VaultConfig, entry: &VaultEntryConfig, mailbox: &Mailbox) -> Result<CrossChainVault> {
    let chain = parse_chain(&entry.chain)?;

    let store: Box<dyn OutboxStore> = match &config.service.outbox_dir {
        Some(dir) => Box::new(JsonFileOutboxStore::new(
            Path::new(dir).join(format!("{}.json", chain)),
        )),
        None => Box::new(InMemoryOutboxStore::new()),
    };
    let outbox = Outbox::open(store, config.retry)
        .with_context(|| format!("Failed to open outbox for {}", chain))?
        .with_retention(config.service.dispatched_retention);

    let mut vault = CrossChainVault::with_repositories(
        chain,
        &entry.address,
        u128::from(entry.collateral_ratio_bps),
        Amount::from(entry.min_fee_floor),
        Box::new(InMemoryTrustRegistry::new()),
        Box::new(InMemoryProcessedRegistry::new()),
        Box::new(InMemoryWatermarkRegistry::new()),
        outbox,
    )?;
    if entry.reserve > 0 {
        vault.fund_reserve(Amount::from(entry.reserve));
    }

    for protocol in &config.protocol {
        let names = protocol.name_table()?;
        if !names.contains(chain) {
            continue;
        }
        match protocol.kind {
            ProtocolKind::Loopback => {
                vault.register_adapter(Arc::new(LoopbackAdapter::new(
                    chain,
                    names,
                    protocol.fee_model(),
                    mailbox.clone(),
                )))?;
            }
            ProtocolKind::Http => {
                let url = protocol
                    .relay_url
                    .as_deref()
                    .with_context(|| format!("Protocol '{}' has no relay_url", protocol.name))?;
                vault.register_adapter(Arc::new(HttpRelayAdapter::new(
                    url,
                    chain,
                    names,
                    Duration::from_millis(protocol.timeout_ms),
                )?))?;
            }
        }
    }

    for (remote, address) in &entry.trusted {
        let remote = parse_chain(remote)?;
        vault.set_trusted_vault(remote, address)?;
        vault.add_peer(remote)?;
    }
    for (remote, protocol) in &entry.preferred {
        vault.set_preferred_protocol(parse_chain(remote)?, protocol)?;
    }

    Ok(vault)
}

/// Builds the router with its configured liquidity sources.
pub fn build_router(config: &RouterConfig) -> LiquidityRouter {
    let rate_model: KinkedRateModel = config.rate_model;
    let mut router = LiquidityRouter::new(config.local_asset.clone(), Box::new(rate_model));
    router.set_default_preferences(config.defaults);

    if let Some(cross_chain) = &config.cross_chain {
        let mut reserves = StaticRemoteReserves::new(
            cross_chain.fee_bps,
            cross_chain.estimated_time_seconds,
            cross_chain.rate_apy_bps,
        );
        for (asset, amount) in &cross_chain.available {
            reserves.set_available(asset, Amount::from(*amount));
        }
        router = router.with_remote_reserves(Box::new(reserves));
    }

    // One adapter per market name, in first-seen order
    let mut markets: Vec<StaticMarketAdapter> = Vec::new();
    for market in &config.external {
        let index = match markets.iter().position(|m| m.name() == market.name) {
            Some(index) => index,
            None => {
                markets.push(StaticMarketAdapter::new(market.name.clone()));
                markets.len() - 1
            }
        };
        markets[index].add_market(&market.asset, market.terms());
    }
    for market in markets {
        router.add_external(Box::new(market));
    }
    router
}

/// Builds an oracle whose configured readings are stamped at `now`.
pub fn build_oracle(config: &OracleConfig, now: u64) -> FixedPriceOracle {
    let mut oracle = FixedPriceOracle::new(config.native_asset.clone(), config.max_age_secs);
    for (asset, price) in &config.prices {
        oracle.set_price(asset, i128::from(*price), now);
    }
    oracle
}
