//! Unit tests for configuration module

use credit_vault::chains::ChainId;
use credit_vault::config::{ProtocolKind, VaultConfig};
use credit_vault::ledger::LedgerAction;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Two vaults trusting each other over one loopback protocol.
const TWO_VAULTS: &str = r#"
[[vault]]
chain = "ethereum"
address = "0x00000000000000000000000000000000000000E1"
collateral_ratio_bps = 7500
min_fee_floor = 10

[vault.trusted]
arbitrum = "0x00000000000000000000000000000000000000a1"

[vault.preferred]
arbitrum = "loopback"

[[vault]]
chain = "arbitrum"
address = "0x00000000000000000000000000000000000000a1"
collateral_ratio_bps = 7500

[vault.trusted]
ethereum = "0x00000000000000000000000000000000000000e1"

[vault.preferred]
ethereum = "loopback"

[[protocol]]
name = "loopback"
kind = "loopback"
base_fee = 10

[protocol.chain_names]
ethereum = "ethereum"
arbitrum = "arbitrum"
"#;

/// Create a minimal valid VaultConfig for testing
fn create_test_config() -> VaultConfig {
    toml::from_str(TWO_VAULTS).unwrap()
}

fn assert_invalid(config: &VaultConfig, expected: &str) {
    let result = config.validate();
    assert!(result.is_err(), "expected error containing '{}'", expected);
    let message = result.unwrap_err().to_string();
    assert!(
        message.contains(expected),
        "error '{}' does not contain '{}'",
        message,
        expected
    );
}

// ============================================================================
// LOADING TESTS
// ============================================================================

/// What is tested: A minimal two-vault document parses with defaults filled in
/// Why: Optional sections must not be required in TOML
#[test]
fn test_config_defaults() {
    let config = VaultConfig::from_toml(TWO_VAULTS).unwrap();

    assert_eq!(config.vault.len(), 2);
    assert_eq!(config.service.dispatch_interval_ms, 500);
    assert!(config.service.outbox_dir.is_none());
    assert_eq!(config.service.dispatched_retention, 1_000);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.router.local_asset, "USDC");
    assert_eq!(config.oracle.max_age_secs, 300);
    assert!(config.demo_action.is_empty());

    let protocol = config.protocol_named("loopback").unwrap();
    assert_eq!(protocol.kind, ProtocolKind::Loopback);
    assert_eq!(protocol.fee_model().base_fee, 10);
    assert_eq!(protocol.timeout_ms, 10_000);

    let ethereum = config.vault_for(ChainId::Ethereum).unwrap();
    assert_eq!(ethereum.min_fee_floor, 10);
    assert!(config.vault_for(ChainId::Base).is_none());
}

/// What is tested: Integer amounts, ratios and prices parse from TOML and widen to ledger amounts
/// Why: TOML integers are 64-bit; wider config fields would reject every document
#[test]
fn test_integer_fields_parse_and_widen() {
    let extra = r#"
[router.cross_chain]
fee_bps = 10
estimated_time_seconds = 300

[router.cross_chain.available]
USDC = 9223372036854775807

[oracle.prices]
ETH = 350000000000

[[demo_action]]
chain = "ethereum"
user = "0x0000000000000000000000000000000000000001"
action = "borrow"
amount = 300
fee = 20
"#;
    let toml = format!(
        "{}{}",
        TWO_VAULTS.replace("min_fee_floor = 10", "min_fee_floor = 10\nreserve = 5000"),
        extra
    );
    let config = VaultConfig::from_toml(&toml).unwrap();

    let ethereum = config.vault_for(ChainId::Ethereum).unwrap();
    assert_eq!(ethereum.collateral_ratio_bps, 7_500);
    assert_eq!(ethereum.reserve, 5_000);

    let fee_model = config.protocol_named("loopback").unwrap().fee_model();
    assert_eq!(fee_model.base_fee, 10u128);

    let cross_chain = config.router.cross_chain.as_ref().unwrap();
    assert_eq!(cross_chain.available["USDC"], i64::MAX as u64);
    assert_eq!(config.oracle.prices["ETH"], 350_000_000_000);
    assert_eq!(config.demo_action[0].action, LedgerAction::Borrow);
    assert_eq!(config.demo_action[0].amount, 300);
}

/// What is tested: The shipped devnet config and template both validate
/// Why: Broken sample configs would fail on first run
#[test]
fn test_shipped_configs_validate() {
    let devnet = VaultConfig::load_from_path(Some("config/credit-vault.toml")).unwrap();
    assert_eq!(devnet.vault.len(), 3);
    assert_eq!(devnet.demo_action[0].action, LedgerAction::Deposit);

    let template = VaultConfig::load_from_path(Some("config/credit-vault.template.toml")).unwrap();
    assert_eq!(template.vault.len(), 2);
}

/// What is tested: A missing config file reports how to create one
/// Why: First-run errors should point at the template
#[test]
fn test_missing_config_file() {
    let result = VaultConfig::load_from_path(Some("config/does-not-exist.toml"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("credit-vault.template.toml"));
}

// ============================================================================
// VALIDATION TESTS
// ============================================================================

/// What is tested: VaultConfig::validate() accepts valid configuration
/// Why: Ensure valid configs pass validation
#[test]
fn test_config_validation_success() {
    let config = create_test_config();
    assert!(config.validate().is_ok());
}

/// What is tested: validate() rejects a configuration without vaults
/// Why: A devnet needs at least one chain
#[test]
fn test_config_validation_no_vaults() {
    let mut config = create_test_config();
    config.vault.clear();
    config.protocol.clear();
    assert_invalid(&config, "At least one [[vault]]");
}

/// What is tested: validate() rejects two vaults on the same chain
/// Why: Each chain has exactly one authoritative vault
#[test]
fn test_config_validation_duplicate_chain() {
    let mut config = create_test_config();
    config.vault[1].chain = "ethereum".to_string();
    assert_invalid(&config, "more than one [[vault]]");
}

/// What is tested: validate() rejects unknown chain names
/// Why: Chains form a closed set
#[test]
fn test_config_validation_unknown_chain() {
    let mut config = create_test_config();
    config.vault[1].chain = "solana".to_string();
    assert_invalid(&config, "Unknown chain 'solana'");
}

/// What is tested: validate() rejects malformed vault addresses
/// Why: Addresses are compared after normalization and must parse
#[test]
fn test_config_validation_bad_address() {
    let mut config = create_test_config();
    config.vault[0].address = "0x1234".to_string();
    assert_invalid(&config, "Invalid address length");
}

/// What is tested: validate() rejects collateral ratios outside 1..=10000 bps
/// Why: A ratio above 100% would let users borrow more than they deposit
#[test]
fn test_config_validation_collateral_ratio() {
    let mut config = create_test_config();
    config.vault[0].collateral_ratio_bps = 10_001;
    assert_invalid(&config, "collateral_ratio_bps");

    config.vault[0].collateral_ratio_bps = 0;
    assert_invalid(&config, "collateral_ratio_bps");
}

/// What is tested: validate() rejects one-sided trust
/// Why: Messages the remote vault would reject must be caught at load time
#[test]
fn test_config_validation_asymmetric_trust() {
    let mut config = create_test_config();
    config.vault[1].trusted.clear();
    config.vault[1].preferred.clear();
    assert_invalid(&config, "Asymmetric trust link");
}

/// What is tested: validate() rejects trust in an address that is not the configured vault
/// Why: A typo would silently send every message to the wrong contract
#[test]
fn test_config_validation_trust_wrong_address() {
    let mut config = create_test_config();
    config.vault[0].trusted.insert(
        "arbitrum".to_string(),
        "0x00000000000000000000000000000000000000a2".to_string(),
    );
    assert_invalid(&config, "but the vault there is");
}

/// What is tested: validate() rejects trust in a chain without a configured vault
/// Why: Trust links must name a real peer
#[test]
fn test_config_validation_trust_unknown_vault() {
    let mut config = create_test_config();
    config.vault[0].trusted.insert(
        "base".to_string(),
        "0x00000000000000000000000000000000000000b1".to_string(),
    );
    assert_invalid(&config, "no vault is configured there");
}

/// What is tested: validate() requires a preferred protocol for every peer
/// Why: Operations would otherwise fail with NoPreferredProtocol at runtime
#[test]
fn test_config_validation_missing_preferred() {
    let mut config = create_test_config();
    config.vault[0].preferred.clear();
    assert_invalid(&config, "no preferred protocol for peer arbitrum");
}

/// What is tested: validate() rejects preferred protocols that are not configured
/// Why: Routes must resolve to a registered adapter
#[test]
fn test_config_validation_unknown_protocol() {
    let mut config = create_test_config();
    config.vault[0]
        .preferred
        .insert("arbitrum".to_string(), "wormhole".to_string());
    assert_invalid(&config, "unknown protocol 'wormhole'");
}

/// What is tested: validate() rejects routes whose protocol cannot name both ends
/// Why: The adapter must translate both source and destination chains
#[test]
fn test_config_validation_protocol_missing_chain() {
    let mut config = create_test_config();
    config.protocol[0].chain_names.remove("arbitrum");
    assert_invalid(&config, "has no name for arbitrum");
}

/// What is tested: validate() rejects a preferred protocol for a chain without trust
/// Why: A route without a trusted vault can never be used
#[test]
fn test_config_validation_preferred_without_trust() {
    let mut config = create_test_config();
    config.vault[0]
        .preferred
        .insert("base".to_string(), "loopback".to_string());
    assert_invalid(&config, "without a trust link");
}

/// What is tested: validate() rejects duplicate protocol names and shared chain names
/// Why: Protocol names key the adapter registry; chain names must be unambiguous
#[test]
fn test_config_validation_protocol_tables() {
    let mut config = create_test_config();
    config.protocol.push(config.protocol[0].clone());
    assert_invalid(&config, "configured more than once");

    let mut config = create_test_config();
    config.protocol[0]
        .chain_names
        .insert("arbitrum".to_string(), "ethereum".to_string());
    assert_invalid(&config, "maps both");
}

/// What is tested: validate() requires relay_url for http protocols
/// Why: The HTTP adapter cannot be built without a relay endpoint
#[test]
fn test_config_validation_http_requires_url() {
    let mut config = create_test_config();
    config.protocol[0].kind = ProtocolKind::Http;
    assert_invalid(&config, "require relay_url");

    config.protocol[0].relay_url = Some("http://127.0.0.1:3334".to_string());
    assert!(config.validate().is_ok());
}

/// What is tested: validate() rejects an unusable retry policy
/// Why: Zero attempts would dead-letter every message immediately
#[test]
fn test_config_validation_retry_policy() {
    let mut config = create_test_config();
    config.retry.max_attempts = 0;
    assert_invalid(&config, "max_attempts");

    let mut config = create_test_config();
    config.retry.base_backoff_ms = 120_000;
    assert_invalid(&config, "exceeds retry.max_backoff_ms");
}

/// What is tested: validate() rejects demo actions on chains without a vault
/// Why: Demo actions run against configured vaults only
#[test]
fn test_config_validation_demo_action_chain() {
    let toml = format!(
        "{}\n[[demo_action]]\nchain = \"base\"\nuser = \"0x0000000000000000000000000000000000000001\"\naction = \"deposit\"\namount = 10\n",
        TWO_VAULTS
    );
    let result = VaultConfig::from_toml(&toml);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("has no vault"));
}
