//! Interest rate models.
//!
//! Rates are annualized basis points derived from pool utilization.

use serde::{Deserialize, Serialize};

use crate::types::{Amount, BPS_DENOMINATOR};

pub trait InterestRateModel: Send + Sync {
    /// Variable borrow rate in bps for the given pool totals.
    fn variable_rate(&self, total_supplied: Amount, total_borrowed: Amount) -> u64;

    /// Stable borrow rate in bps; never below the variable rate.
    fn stable_rate(&self, total_supplied: Amount, total_borrowed: Amount) -> u64;
}

/// Two-slope model: `slope1` applies up to the kink utilization, `slope2`
/// above it. The stable rate adds a fixed premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KinkedRateModel {
    pub base_rate_bps: u64,
    pub slope1_bps: u64,
    pub slope2_bps: u64,
    pub kink_bps: u64,
    pub stable_premium_bps: u64,
}

impl Default for KinkedRateModel {
    fn default() -> Self {
        Self {
            base_rate_bps: 200,
            slope1_bps: 400,
            slope2_bps: 6_000,
            kink_bps: 8_000,
            stable_premium_bps: 100,
        }
    }
}

impl KinkedRateModel {
    /// Borrowed over supplied in bps, capped at 100%.
    pub fn utilization_bps(total_supplied: Amount, total_borrowed: Amount) -> u64 {
        if total_supplied == 0 {
            return 0;
        }
        let utilization = total_borrowed.saturating_mul(BPS_DENOMINATOR) / total_supplied;
        utilization.min(BPS_DENOMINATOR) as u64
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kink_bps == 0 || self.kink_bps > BPS_DENOMINATOR as u64 {
            anyhow::bail!("Rate model kink must be in 1..=10000 bps, got {}", self.kink_bps);
        }
        Ok(())
    }
}

impl InterestRateModel for KinkedRateModel {
    /// Fields are public and may bypass `validate()`: the kink is clamped to
    /// 1..=10000 and all arithmetic saturates.
    fn variable_rate(&self, total_supplied: Amount, total_borrowed: Amount) -> u64 {
        let utilization = Self::utilization_bps(total_supplied, total_borrowed);
        let denom = BPS_DENOMINATOR as u64;
        let kink = self.kink_bps.clamp(1, denom);

        if utilization <= kink {
            self.base_rate_bps
                .saturating_add(self.slope1_bps.saturating_mul(utilization) / kink)
        } else {
            let excess = utilization - kink;
            let headroom = (denom - kink).max(1);
            self.base_rate_bps
                .saturating_add(self.slope1_bps)
                .saturating_add(self.slope2_bps.saturating_mul(excess) / headroom)
        }
    }

    fn stable_rate(&self, total_supplied: Amount, total_borrowed: Amount) -> u64 {
        self.variable_rate(total_supplied, total_borrowed)
            .saturating_add(self.stable_premium_bps)
    }
}
