//! Unit tests for the position ledger

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{DUMMY_USER, DUMMY_USER_2, TEST_COLLATERAL_RATIO_BPS};

use credit_vault::chains::ChainId;
use credit_vault::ledger::{LedgerAction, LedgerError, Position, PositionLedger};

const LOCAL: ChainId = ChainId::Ethereum;
const REMOTE: ChainId = ChainId::Arbitrum;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn create_ledger() -> PositionLedger {
    PositionLedger::new(LOCAL, TEST_COLLATERAL_RATIO_BPS).unwrap()
}

/// Asserts the local invariant: total borrowed never exceeds the credit line.
fn assert_solvent(ledger: &PositionLedger, user: &str) {
    assert!(ledger.total_borrowed(user) <= ledger.credit_line(user));
}

// ============================================================================
// LOCAL OPERATIONS
// ============================================================================

/// What is tested: Every local operation rejects a zero amount
/// Why: Zero-amount operations would emit meaningless sync messages
#[test]
fn test_zero_amount_rejected() {
    let mut ledger = create_ledger();
    for action in [
        LedgerAction::Deposit,
        LedgerAction::Withdraw,
        LedgerAction::Borrow,
        LedgerAction::Repay,
    ] {
        assert_eq!(
            ledger.apply_local(DUMMY_USER, action, 0),
            Err(LedgerError::ZeroAmount),
            "{:?}",
            action
        );
    }
    assert!(ledger.users().is_empty());
}

/// What is tested: Each committed operation returns an intent describing it
/// Why: Intents feed the outbound sync messages
#[test]
fn test_operations_return_intents() {
    let mut ledger = create_ledger();
    let intent = ledger.deposit(DUMMY_USER, 1_000).unwrap();
    assert_eq!(intent.action, LedgerAction::Deposit);
    assert_eq!(intent.amount, 1_000);
    assert_eq!(intent.user, DUMMY_USER);

    let intent = ledger.borrow_local(DUMMY_USER, 100).unwrap();
    assert_eq!(intent.action, LedgerAction::Borrow);
    assert_solvent(&ledger, DUMMY_USER);
}

/// What is tested: Borrowing is capped by both the credit line and pool liquidity
/// Why: The pool cannot lend cash it does not hold
#[test]
fn test_borrow_limits() {
    let mut ledger = create_ledger();
    // Remote collateral gives credit but no local cash
    ledger
        .apply_remote_delta(DUMMY_USER, REMOTE, LedgerAction::Deposit, 1_000)
        .unwrap();
    assert_eq!(ledger.available_credit(DUMMY_USER), 750);

    assert_eq!(
        ledger.borrow_local(DUMMY_USER, 100),
        Err(LedgerError::InsufficientLiquidity {
            available: 0,
            requested: 100
        })
    );

    ledger.fund_reserve(500);
    ledger.borrow_local(DUMMY_USER, 500).unwrap();
    assert_eq!(ledger.available_liquidity(), 0);

    ledger.fund_reserve(1_000);
    assert_eq!(
        ledger.borrow_local(DUMMY_USER, 251),
        Err(LedgerError::ExceedsCreditLine {
            available: 250,
            requested: 251
        })
    );
    assert_solvent(&ledger, DUMMY_USER);
}

/// What is tested: Repay is limited to debt drawn on this chain
/// Why: Debt on other chains is repaid there
#[test]
fn test_repay_limited_to_local_debt() {
    let mut ledger = create_ledger();
    ledger.deposit(DUMMY_USER, 1_000).unwrap();
    ledger.borrow_local(DUMMY_USER, 100).unwrap();
    ledger
        .apply_remote_delta(DUMMY_USER, REMOTE, LedgerAction::Borrow, 200)
        .unwrap();

    assert_eq!(
        ledger.repay_local(DUMMY_USER, 150),
        Err(LedgerError::RepayExceedsDebt {
            outstanding: 100,
            requested: 150
        })
    );
    ledger.repay_local(DUMMY_USER, 100).unwrap();
    assert_eq!(ledger.total_borrowed(DUMMY_USER), 200);
}

/// What is tested: Withdraw is limited to local collateral
/// Why: Collateral on other chains is withdrawn there
#[test]
fn test_withdraw_limited_to_local_collateral() {
    let mut ledger = create_ledger();
    ledger.deposit(DUMMY_USER, 100).unwrap();
    ledger
        .apply_remote_delta(DUMMY_USER, REMOTE, LedgerAction::Deposit, 900)
        .unwrap();

    assert_eq!(
        ledger.withdraw(DUMMY_USER, 101),
        Err(LedgerError::InsufficientCollateral {
            available: 100,
            requested: 101
        })
    );
    ledger.withdraw(DUMMY_USER, 100).unwrap();
    assert_eq!(ledger.total_collateral(DUMMY_USER), 900);
}

/// What is tested: validate() predicts apply_local() without mutating
/// Why: Vault operations validate before committing their outbox entries
#[test]
fn test_validate_does_not_mutate() {
    let mut ledger = create_ledger();
    ledger.deposit(DUMMY_USER, 1_000).unwrap();

    assert!(ledger.validate(DUMMY_USER, LedgerAction::Withdraw, 1_000).is_ok());
    assert_eq!(ledger.total_collateral(DUMMY_USER), 1_000);
    assert!(ledger.validate(DUMMY_USER, LedgerAction::Borrow, 751).is_err());
    assert_eq!(ledger.total_borrowed(DUMMY_USER), 0);
}

// ============================================================================
// REMOTE UPDATES AND QUERIES
// ============================================================================

/// What is tested: A snapshot replaces only the sender's entry
/// Why: Each chain is authoritative only for its own balances
#[test]
fn test_snapshot_replaces_sender_entry() {
    let mut ledger = create_ledger();
    ledger.deposit(DUMMY_USER, 100).unwrap();
    ledger
        .apply_remote_delta(DUMMY_USER, ChainId::Base, LedgerAction::Deposit, 50)
        .unwrap();
    ledger
        .apply_remote_delta(DUMMY_USER, REMOTE, LedgerAction::Deposit, 999)
        .unwrap();

    let snapshot = Position {
        collateral: 300,
        borrowed: 20,
    };
    ledger.apply_remote_snapshot(DUMMY_USER, REMOTE, snapshot).unwrap();

    assert_eq!(ledger.position(DUMMY_USER, REMOTE), snapshot);
    assert_eq!(ledger.position(DUMMY_USER, LOCAL).collateral, 100);
    assert_eq!(ledger.position(DUMMY_USER, ChainId::Base).collateral, 50);
    assert_eq!(
        ledger.apply_remote_snapshot(DUMMY_USER, LOCAL, snapshot),
        Err(LedgerError::LocalChainUpdate(LOCAL))
    );
}

/// What is tested: summary() aggregates all chains and reports health
/// Why: Every vault exposes the same global view of a user
#[test]
fn test_summary_aggregates_chains() {
    let mut ledger = create_ledger();
    ledger.fund_reserve(1_000);
    ledger.deposit(DUMMY_USER, 600).unwrap();
    ledger
        .apply_remote_delta(DUMMY_USER, REMOTE, LedgerAction::Deposit, 400)
        .unwrap();
    ledger.borrow_local(DUMMY_USER, 500).unwrap();

    let summary = ledger.summary(DUMMY_USER);
    assert_eq!(summary.total_collateral, 1_000);
    assert_eq!(summary.total_borrowed, 500);
    assert_eq!(summary.credit_line, 750);
    assert_eq!(summary.available_credit, 250);
    assert_eq!(summary.health_ratio_bps, Some(15_000));
    assert_eq!(summary.per_chain.len(), 2);

    let empty = ledger.summary(DUMMY_USER_2);
    assert_eq!(empty.total_collateral, 0);
    assert_eq!(empty.health_ratio_bps, None);
    assert!(empty.per_chain.is_empty());
}

/// What is tested: Pool totals count only local positions
/// Why: Remote collateral is not cash in this chain's pool
#[test]
fn test_pool_totals_are_local() {
    let mut ledger = create_ledger();
    ledger.deposit(DUMMY_USER, 400).unwrap();
    ledger.deposit(DUMMY_USER_2, 100).unwrap();
    ledger.borrow_local(DUMMY_USER, 200).unwrap();
    ledger
        .apply_remote_delta(DUMMY_USER_2, REMOTE, LedgerAction::Deposit, 10_000)
        .unwrap();

    assert_eq!(ledger.local_supplied(), 500);
    assert_eq!(ledger.local_borrowed(), 200);
    assert_eq!(ledger.available_liquidity(), 300);
    assert_eq!(ledger.users(), vec![DUMMY_USER.to_string(), DUMMY_USER_2.to_string()]);
}
