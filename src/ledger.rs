//! Position Ledger
//!
//! Per-user, per-chain collateral and borrow balances as seen from one chain.
//! The local chain's entries are authoritative; entries for remote chains are
//! this chain's current view, updated only through [`PositionLedger::apply_remote_delta`]
//! and [`PositionLedger::apply_remote_snapshot`].
//!
//! Local operations validate first, then mutate, then hand back an
//! [`OutboundIntent`] describing the notification that remote chains need.
//! Nothing here performs I/O.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

use crate::chains::ChainId;
use crate::types::{apply_bps, Amount, BPS_DENOMINATOR};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Insufficient collateral: available={available}, requested={requested}")]
    InsufficientCollateral { available: Amount, requested: Amount },

    #[error("Borrow exceeds credit line: available={available}, requested={requested}")]
    ExceedsCreditLine { available: Amount, requested: Amount },

    #[error("Withdrawal would leave position undercollateralized: credit_line={credit_line}, borrowed={borrowed}")]
    Undercollateralized { credit_line: Amount, borrowed: Amount },

    #[error("Repay exceeds outstanding debt: outstanding={outstanding}, requested={requested}")]
    RepayExceedsDebt { outstanding: Amount, requested: Amount },

    #[error("Insufficient pool liquidity: available={available}, requested={requested}")]
    InsufficientLiquidity { available: Amount, requested: Amount },

    #[error("Remote update targets the local chain {0}")]
    LocalChainUpdate(ChainId),

    #[error("Collateral ratio {0} bps must be in 1..=10000")]
    InvalidCollateralRatio(u128),
}

/// Kind of ledger mutation, shared by local operations and remote deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerAction {
    Deposit,
    Withdraw,
    Borrow,
    Repay,
}

/// Balances of one user on one chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub collateral: Amount,
    pub borrowed: Amount,
}

impl Position {
    pub fn is_zero(&self) -> bool {
        self.collateral == 0 && self.borrowed == 0
    }
}

/// Notification that must reach remote chains after a committed local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundIntent {
    pub user: String,
    pub chain: ChainId,
    pub action: LedgerAction,
    pub amount: Amount,
}

/// Aggregate view of a user's global position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    pub total_collateral: Amount,
    pub total_borrowed: Amount,
    pub credit_line: Amount,
    pub available_credit: Amount,
    /// Credit line over borrowed, in bps. `None` when nothing is borrowed.
    pub health_ratio_bps: Option<u128>,
    pub per_chain: BTreeMap<ChainId, Position>,
}

/// Position ledger of a single chain.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    local_chain: ChainId,
    collateral_ratio_bps: u128,
    /// Protocol-owned liquidity on this chain, lendable alongside deposits.
    reserve: Amount,
    positions: HashMap<String, BTreeMap<ChainId, Position>>,
}

impl PositionLedger {
    /// Creates an empty ledger for `local_chain`.
    ///
    /// `collateral_ratio_bps` is the loan-to-value ratio (7500 = 75%).
    pub fn new(local_chain: ChainId, collateral_ratio_bps: u128) -> Result<Self, LedgerError> {
        if collateral_ratio_bps == 0 || collateral_ratio_bps > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidCollateralRatio(collateral_ratio_bps));
        }
        Ok(Self {
            local_chain,
            collateral_ratio_bps,
            reserve: 0,
            positions: HashMap::new(),
        })
    }

    pub fn local_chain(&self) -> ChainId {
        self.local_chain
    }

    pub fn collateral_ratio_bps(&self) -> u128 {
        self.collateral_ratio_bps
    }

    // =========================================================================
    // Local operations
    // =========================================================================

    /// Adds collateral on the local chain. Creates the position on first use.
    pub fn deposit(&mut self, user: &str, amount: Amount) -> Result<OutboundIntent, LedgerError> {
        self.apply_local(user, LedgerAction::Deposit, amount)
    }

    /// Removes local collateral, keeping the global position within its credit line.
    pub fn withdraw(&mut self, user: &str, amount: Amount) -> Result<OutboundIntent, LedgerError> {
        self.apply_local(user, LedgerAction::Withdraw, amount)
    }

    /// Borrows on the local chain against the locally known global collateral.
    pub fn borrow_local(&mut self, user: &str, amount: Amount) -> Result<OutboundIntent, LedgerError> {
        self.apply_local(user, LedgerAction::Borrow, amount)
    }

    /// Repays debt recorded on the local chain.
    pub fn repay_local(&mut self, user: &str, amount: Amount) -> Result<OutboundIntent, LedgerError> {
        self.apply_local(user, LedgerAction::Repay, amount)
    }

    /// Validates and commits a local operation.
    pub fn apply_local(
        &mut self,
        user: &str,
        action: LedgerAction,
        amount: Amount,
    ) -> Result<OutboundIntent, LedgerError> {
        self.validate(user, action, amount)?;

        let local = self.local_entry(user);
        match action {
            LedgerAction::Deposit => local.collateral = local.collateral.saturating_add(amount),
            LedgerAction::Withdraw => local.collateral -= amount,
            LedgerAction::Borrow => local.borrowed = local.borrowed.saturating_add(amount),
            LedgerAction::Repay => local.borrowed -= amount,
        }

        Ok(self.intent(user, action, amount))
    }

    /// Checks a local operation against the current view without mutating.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The operation would succeed if applied now
    /// * `Err(LedgerError)` - The first violated rule
    pub fn validate(&self, user: &str, action: LedgerAction, amount: Amount) -> Result<(), LedgerError> {
        ensure_non_zero(amount)?;

        match action {
            LedgerAction::Deposit => Ok(()),
            LedgerAction::Withdraw => {
                let local = self.position(user, self.local_chain);
                if local.collateral < amount {
                    return Err(LedgerError::InsufficientCollateral {
                        available: local.collateral,
                        requested: amount,
                    });
                }

                let remaining_collateral = self.total_collateral(user) - amount;
                let credit_after = apply_bps(remaining_collateral, self.collateral_ratio_bps);
                let borrowed = self.total_borrowed(user);
                if borrowed > credit_after {
                    return Err(LedgerError::Undercollateralized {
                        credit_line: credit_after,
                        borrowed,
                    });
                }
                Ok(())
            }
            LedgerAction::Borrow => {
                let available = self.available_credit(user);
                if amount > available {
                    return Err(LedgerError::ExceedsCreditLine {
                        available,
                        requested: amount,
                    });
                }

                let liquidity = self.available_liquidity();
                if amount > liquidity {
                    return Err(LedgerError::InsufficientLiquidity {
                        available: liquidity,
                        requested: amount,
                    });
                }
                Ok(())
            }
            LedgerAction::Repay => {
                let outstanding = self.position(user, self.local_chain).borrowed;
                if amount > outstanding {
                    return Err(LedgerError::RepayExceedsDebt {
                        outstanding,
                        requested: amount,
                    });
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Remote updates
    // =========================================================================

    /// Adds a delta reported by `chain` to this ledger's view of that chain.
    ///
    /// Subtractions saturate at zero: a view that would go negative means an
    /// earlier message from that chain never arrived, which only a snapshot
    /// from the source can repair.
    pub fn apply_remote_delta(
        &mut self,
        user: &str,
        chain: ChainId,
        action: LedgerAction,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if chain == self.local_chain {
            return Err(LedgerError::LocalChainUpdate(chain));
        }

        let entry = self
            .positions
            .entry(user.to_string())
            .or_default()
            .entry(chain)
            .or_default();

        match action {
            LedgerAction::Deposit => entry.collateral = entry.collateral.saturating_add(amount),
            LedgerAction::Borrow => entry.borrowed = entry.borrowed.saturating_add(amount),
            LedgerAction::Withdraw => {
                if entry.collateral < amount {
                    warn!(
                        "Remote withdraw of {} exceeds known collateral {} for user {} on {}; clamping to zero",
                        amount, entry.collateral, user, chain
                    );
                }
                entry.collateral = entry.collateral.saturating_sub(amount);
            }
            LedgerAction::Repay => {
                if entry.borrowed < amount {
                    warn!(
                        "Remote repay of {} exceeds known debt {} for user {} on {}; clamping to zero",
                        amount, entry.borrowed, user, chain
                    );
                }
                entry.borrowed = entry.borrowed.saturating_sub(amount);
            }
        }

        debug!(
            "Applied remote {:?} of {} for user {} from {} -> {:?}",
            action, amount, user, chain, entry
        );
        Ok(())
    }

    /// Overwrites this ledger's view of `chain` with the balances that chain asserts.
    pub fn apply_remote_snapshot(
        &mut self,
        user: &str,
        chain: ChainId,
        snapshot: Position,
    ) -> Result<(), LedgerError> {
        if chain == self.local_chain {
            return Err(LedgerError::LocalChainUpdate(chain));
        }

        let entry = self
            .positions
            .entry(user.to_string())
            .or_default()
            .entry(chain)
            .or_default();
        debug!(
            "Replacing view of user {} on {}: {:?} -> {:?}",
            user, chain, entry, snapshot
        );
        *entry = snapshot;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn position(&self, user: &str, chain: ChainId) -> Position {
        self.positions
            .get(user)
            .and_then(|chains| chains.get(&chain))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_collateral(&self, user: &str) -> Amount {
        self.positions
            .get(user)
            .map(|chains| chains.values().map(|p| p.collateral).sum())
            .unwrap_or(0)
    }

    pub fn total_borrowed(&self, user: &str) -> Amount {
        self.positions
            .get(user)
            .map(|chains| chains.values().map(|p| p.borrowed).sum())
            .unwrap_or(0)
    }

    pub fn credit_line(&self, user: &str) -> Amount {
        apply_bps(self.total_collateral(user), self.collateral_ratio_bps)
    }

    pub fn available_credit(&self, user: &str) -> Amount {
        self.credit_line(user).saturating_sub(self.total_borrowed(user))
    }

    /// Credit line over total borrowed in bps; `None` without debt.
    pub fn health_ratio_bps(&self, user: &str) -> Option<u128> {
        let borrowed = self.total_borrowed(user);
        if borrowed == 0 {
            return None;
        }
        Some(self.credit_line(user).saturating_mul(BPS_DENOMINATOR) / borrowed)
    }

    pub fn summary(&self, user: &str) -> PositionSummary {
        PositionSummary {
            total_collateral: self.total_collateral(user),
            total_borrowed: self.total_borrowed(user),
            credit_line: self.credit_line(user),
            available_credit: self.available_credit(user),
            health_ratio_bps: self.health_ratio_bps(user),
            per_chain: self.positions.get(user).cloned().unwrap_or_default(),
        }
    }

    /// Users with any recorded position on any chain.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.positions.keys().cloned().collect();
        users.sort();
        users
    }

    // =========================================================================
    // Pool liquidity
    // =========================================================================

    /// Adds protocol-owned liquidity to the local pool.
    pub fn fund_reserve(&mut self, amount: Amount) {
        self.reserve = self.reserve.saturating_add(amount);
    }

    /// Collateral deposited on this chain across all users.
    pub fn local_supplied(&self) -> Amount {
        self.positions
            .values()
            .filter_map(|chains| chains.get(&self.local_chain))
            .map(|p| p.collateral)
            .sum()
    }

    /// Debt drawn on this chain across all users.
    pub fn local_borrowed(&self) -> Amount {
        self.positions
            .values()
            .filter_map(|chains| chains.get(&self.local_chain))
            .map(|p| p.borrowed)
            .sum()
    }

    /// Lendable cash on this chain: reserve plus local deposits minus local debt.
    pub fn available_liquidity(&self) -> Amount {
        self.reserve
            .saturating_add(self.local_supplied())
            .saturating_sub(self.local_borrowed())
    }

    // =========================================================================
    // Internal methods
    // =========================================================================

    fn local_entry(&mut self, user: &str) -> &mut Position {
        self.positions
            .entry(user.to_string())
            .or_default()
            .entry(self.local_chain)
            .or_default()
    }

    fn intent(&self, user: &str, action: LedgerAction, amount: Amount) -> OutboundIntent {
        OutboundIntent {
            user: user.to_string(),
            chain: self.local_chain,
            action,
            amount,
        }
    }
}

fn ensure_non_zero(amount: Amount) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    Ok(())
}
