//! Configuration Management Module
//!
//! Loads the devnet deployment: the vaults (one per chain), the bridge
//! protocols connecting them, outbox retry settings, router defaults and
//! oracle readings. Trust links must be symmetric and every peer must have a
//! preferred protocol that can carry messages both ways; anything else is
//! rejected at load time rather than failing at dispatch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use crate::bridge::FeeModel;
use crate::chains::{ChainId, ChainNameTable};
use crate::ledger::LedgerAction;
use crate::outbox::{RetryPolicy, DEFAULT_DISPATCHED_RETENTION};
use crate::rates::KinkedRateModel;
use crate::router::{MarketTerms, RouterPreferences};
use crate::types::{normalize_address, Amount, BPS_DENOMINATOR};

/// Environment variable overriding the configuration path.
pub const CONFIG_PATH_ENV: &str = "CREDIT_VAULT_CONFIG_PATH";
/// Default configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "config/credit-vault.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

// Integers are read as 64-bit (TOML has no wider integers) and widened to
// `Amount` when the deployment is built.

/// Main configuration structure.
///
/// This structure holds configuration for:
/// - Service loop intervals and outbox persistence
/// - Outbox retry policy
/// - Vaults (use [[vault]] in TOML, one per chain)
/// - Bridge protocols (use [[protocol]] in TOML)
/// - Router defaults and liquidity sources
/// - Oracle readings
/// - Demo actions executed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub vault: Vec<VaultEntryConfig>,
    #[serde(default)]
    pub protocol: Vec<ProtocolConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub demo_action: Vec<DemoActionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Outbox drain interval in milliseconds
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    /// Mailbox relay interval in milliseconds
    #[serde(default = "default_relay_interval_ms")]
    pub relay_interval_ms: u64,
    /// Directory for per-chain outbox files; in-memory outboxes when unset
    #[serde(default)]
    pub outbox_dir: Option<String>,
    /// Dispatched outbox entries kept per vault before the oldest are swept
    #[serde(default = "default_dispatched_retention")]
    pub dispatched_retention: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval_ms(),
            relay_interval_ms: default_relay_interval_ms(),
            outbox_dir: None,
            dispatched_retention: default_dispatched_retention(),
        }
    }
}

/// One vault deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultEntryConfig {
    pub chain: String,
    pub address: String,
    /// Loan-to-value ratio in bps (7500 = 75%)
    pub collateral_ratio_bps: u64,
    #[serde(default)]
    pub min_fee_floor: u64,
    /// Protocol-owned liquidity seeded into the local pool
    #[serde(default)]
    pub reserve: u64,
    /// Remote chain -> trusted vault address; every entry is also a peer
    #[serde(default)]
    pub trusted: BTreeMap<String, String>,
    /// Remote chain -> preferred protocol name
    #[serde(default)]
    pub preferred: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Loopback,
    Http,
}

/// One bridge protocol, instantiated once per vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
    pub kind: ProtocolKind,
    /// Chain -> name used by this protocol
    pub chain_names: BTreeMap<String, String>,
    #[serde(default)]
    pub base_fee: u64,
    #[serde(default)]
    pub fee_per_byte: u64,
    /// Relay base URL (http only)
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

impl ProtocolConfig {
    pub fn fee_model(&self) -> FeeModel {
        FeeModel {
            base_fee: Amount::from(self.base_fee),
            fee_per_byte: Amount::from(self.fee_per_byte),
        }
    }

    /// Parses and validates the chain name table.
    pub fn name_table(&self) -> anyhow::Result<ChainNameTable> {
        let mut entries = Vec::with_capacity(self.chain_names.len());
        for (chain, name) in &self.chain_names {
            entries.push((parse_chain(chain)?, name.clone()));
        }
        ChainNameTable::new(self.name.clone(), entries)
            .map_err(|e| anyhow::anyhow!("Protocol '{}': {}", self.name, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_local_asset")]
    pub local_asset: String,
    #[serde(default)]
    pub defaults: RouterPreferences,
    #[serde(default)]
    pub rate_model: KinkedRateModel,
    #[serde(default)]
    pub cross_chain: Option<CrossChainSourceConfig>,
    #[serde(default)]
    pub external: Vec<ExternalMarketConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local_asset: default_local_asset(),
            defaults: RouterPreferences::default(),
            rate_model: KinkedRateModel::default(),
            cross_chain: None,
            external: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainSourceConfig {
    pub fee_bps: u64,
    pub estimated_time_seconds: u64,
    #[serde(default)]
    pub rate_apy_bps: u64,
    /// Asset -> bridged availability
    #[serde(default)]
    pub available: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalMarketConfig {
    pub name: String,
    pub asset: String,
    pub available: u64,
    pub apy_bps: u64,
    #[serde(default)]
    pub fee_bps: u64,
    #[serde(default)]
    pub estimated_time_seconds: u64,
}

impl ExternalMarketConfig {
    pub fn terms(&self) -> MarketTerms {
        MarketTerms {
            available: Amount::from(self.available),
            apy_bps: self.apy_bps,
            fee_bps: self.fee_bps,
            estimated_time_seconds: self.estimated_time_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_native_asset")]
    pub native_asset: String,
    #[serde(default = "default_max_price_age_secs")]
    pub max_age_secs: u64,
    /// Asset -> price with 8 decimals
    #[serde(default)]
    pub prices: BTreeMap<String, i64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            native_asset: default_native_asset(),
            max_age_secs: default_max_price_age_secs(),
            prices: BTreeMap::new(),
        }
    }
}

/// Local operation executed on startup, with its fee pre-funded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoActionConfig {
    pub chain: String,
    pub user: String,
    pub action: LedgerAction,
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
}

fn default_dispatch_interval_ms() -> u64 {
    500
}

fn default_relay_interval_ms() -> u64 {
    500
}

fn default_dispatched_retention() -> usize {
    DEFAULT_DISPATCHED_RETENTION
}

fn default_relay_timeout_ms() -> u64 {
    10_000
}

fn default_local_asset() -> String {
    "USDC".to_string()
}

fn default_native_asset() -> String {
    "ETH".to_string()
}

fn default_max_price_age_secs() -> u64 {
    300
}

// ============================================================================
// LOADING AND VALIDATION
// ============================================================================

impl VaultConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses CREDIT_VAULT_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// * `Ok(VaultConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - File missing, unparsable, or validation failed
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&content)?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/credit-vault.template.toml config/credit-vault.toml\n\
                Then edit config/credit-vault.toml with your deployment.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: VaultConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn vault_for(&self, chain: ChainId) -> Option<&VaultEntryConfig> {
        self.vault
            .iter()
            .find(|v| parse_chain(&v.chain).ok() == Some(chain))
    }

    pub fn protocol_named(&self, name: &str) -> Option<&ProtocolConfig> {
        self.protocol.iter().find(|p| p.name == name)
    }

    /// Validates the configuration for consistency.
    ///
    /// Checks:
    /// - At least one vault; chains unique; addresses well-formed
    /// - Collateral ratios in 1..=10000 bps
    /// - Protocol names unique; chain name tables valid; http protocols have a URL
    /// - Every trust link points at a configured vault that trusts back
    /// - Every peer has a preferred protocol naming both ends of the link
    /// - Retry policy and router settings are sane
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Configuration is valid
    /// * `Err(anyhow::Error)` - Validation failed with error message
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vault.is_empty() {
            return Err(anyhow::anyhow!(
                "Configuration error: At least one [[vault]] must be configured"
            ));
        }

        // Vault chains and addresses
        let mut addresses: BTreeMap<ChainId, String> = BTreeMap::new();
        for vault in &self.vault {
            let chain = parse_chain(&vault.chain)?;
            let address = normalize_address(&vault.address)
                .map_err(|e| anyhow::anyhow!("Vault on {}: {}", chain, e))?;
            if addresses.insert(chain, address).is_some() {
                return Err(anyhow::anyhow!(
                    "Configuration error: Chain {} has more than one [[vault]]",
                    chain
                ));
            }
            let ratio = u128::from(vault.collateral_ratio_bps);
            if ratio == 0 || ratio > BPS_DENOMINATOR {
                return Err(anyhow::anyhow!(
                    "Vault on {}: collateral_ratio_bps {} must be in 1..=10000",
                    chain,
                    vault.collateral_ratio_bps
                ));
            }
        }

        // Protocols
        let mut tables: BTreeMap<&str, (ChainNameTable, &ProtocolConfig)> = BTreeMap::new();
        for protocol in &self.protocol {
            let table = protocol.name_table()?;
            if protocol.kind == ProtocolKind::Http && protocol.relay_url.is_none() {
                return Err(anyhow::anyhow!(
                    "Protocol '{}': http protocols require relay_url",
                    protocol.name
                ));
            }
            if tables.insert(protocol.name.as_str(), (table, protocol)).is_some() {
                return Err(anyhow::anyhow!(
                    "Configuration error: Protocol '{}' is configured more than once",
                    protocol.name
                ));
            }
        }

        // Trust links and routes
        for vault in &self.vault {
            let chain = parse_chain(&vault.chain)?;
            let own_address = &addresses[&chain];

            for (remote, remote_address) in &vault.trusted {
                let remote = parse_chain(remote)?;
                if remote == chain {
                    return Err(anyhow::anyhow!(
                        "Vault on {} cannot trust itself",
                        chain
                    ));
                }
                let remote_address = normalize_address(remote_address)
                    .map_err(|e| anyhow::anyhow!("Vault on {}: trusted {}: {}", chain, remote, e))?;
                let configured = addresses.get(&remote).ok_or_else(|| {
                    anyhow::anyhow!("Vault on {} trusts {} but no vault is configured there", chain, remote)
                })?;
                if *configured != remote_address {
                    return Err(anyhow::anyhow!(
                        "Vault on {} trusts {} on {}, but the vault there is {}",
                        chain,
                        remote_address,
                        remote,
                        configured
                    ));
                }

                let back = self
                    .vault_for(remote)
                    .and_then(|v| trusted_address(v, chain))
                    .transpose()?;
                if back.as_deref() != Some(own_address.as_str()) {
                    return Err(anyhow::anyhow!(
                        "Asymmetric trust link: {} trusts {}, but {} does not trust {} back",
                        chain,
                        remote,
                        remote,
                        own_address
                    ));
                }

                let protocol = vault
                    .preferred
                    .iter()
                    .find(|(c, _)| parse_chain(c).ok() == Some(remote))
                    .map(|(_, p)| p.as_str())
                    .ok_or_else(|| {
                        anyhow::anyhow!("Vault on {} has no preferred protocol for peer {}", chain, remote)
                    })?;
                let (table, _) = tables.get(protocol).ok_or_else(|| {
                    anyhow::anyhow!("Vault on {} prefers unknown protocol '{}'", chain, protocol)
                })?;
                for end in [chain, remote] {
                    if !table.contains(end) {
                        return Err(anyhow::anyhow!(
                            "Protocol '{}' has no name for {} (route {} -> {})",
                            protocol,
                            end,
                            chain,
                            remote
                        ));
                    }
                }
            }

            for remote in vault.preferred.keys() {
                let remote_chain = parse_chain(remote)?;
                if trusted_address(vault, remote_chain).is_none() {
                    return Err(anyhow::anyhow!(
                        "Vault on {} sets a preferred protocol for {} without a trust link",
                        chain,
                        remote
                    ));
                }
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(anyhow::anyhow!(
                "retry.base_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.base_backoff_ms,
                self.retry.max_backoff_ms
            ));
        }

        self.router.rate_model.validate()?;
        let mut markets = HashSet::new();
        for market in &self.router.external {
            if !markets.insert((&market.name, &market.asset)) {
                return Err(anyhow::anyhow!(
                    "External market '{}' lists asset {} twice",
                    market.name,
                    market.asset
                ));
            }
        }

        for action in &self.demo_action {
            let chain = parse_chain(&action.chain)?;
            if !addresses.contains_key(&chain) {
                return Err(anyhow::anyhow!("Demo action targets {} which has no vault", chain));
            }
        }

        Ok(())
    }
}

/// Parses a chain name from configuration.
pub fn parse_chain(name: &str) -> anyhow::Result<ChainId> {
    ChainId::from_str(name).map_err(|e| anyhow::anyhow!("{}", e))
}

fn trusted_address(vault: &VaultEntryConfig, remote: ChainId) -> Option<anyhow::Result<String>> {
    vault
        .trusted
        .iter()
        .find(|(c, _)| parse_chain(c).ok() == Some(remote))
        .map(|(_, addr)| normalize_address(addr))
}
