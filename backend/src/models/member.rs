//! Member record
//!
//! One participant's standing within a pool. Records are never destroyed
//! while the pool exists; they stay as the historical account of what the
//! member paid, staked and received.
//!
//! # Critical Invariants
//!
//! 1. `has_received_payout ⇒ status ∈ {Active, Withdrawn}`
//! 2. A member is paid at most once over the pool's lifetime
//! 3. `collateral_staked >= 0`

use crate::core::address::PoolId;
use serde::{Deserialize, Serialize};

/// Standing of a member within a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Active,
    /// Missed a contribution that collateral covered
    Late,
    /// Missed a contribution with nothing to cover it; loses payout rights
    Defaulted,
    /// Took an early payout
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    owner: String,
    pool: PoolId,
    contributions_made: u8,
    total_contributed: i64,
    collateral_staked: i64,
    has_deposited_collateral: bool,
    has_contributed_this_cycle: bool,
    has_bid_this_cycle: bool,
    has_received_payout: bool,
    eligible_for_payout: bool,
    status: MemberStatus,
    last_contribution_timestamp: Option<u64>,
    missed_contributions: u8,
    /// Net amount received, once paid
    payout_amount: Option<i64>,
}

impl MemberRecord {
    pub fn new(owner: &str, pool: PoolId) -> Self {
        Self {
            owner: owner.to_string(),
            pool,
            contributions_made: 0,
            total_contributed: 0,
            collateral_staked: 0,
            has_deposited_collateral: false,
            has_contributed_this_cycle: false,
            has_bid_this_cycle: false,
            has_received_payout: false,
            eligible_for_payout: false,
            status: MemberStatus::Active,
            last_contribution_timestamp: None,
            missed_contributions: 0,
            payout_amount: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn pool(&self) -> &PoolId {
        &self.pool
    }

    pub fn contributions_made(&self) -> u8 {
        self.contributions_made
    }

    pub fn total_contributed(&self) -> i64 {
        self.total_contributed
    }

    pub fn collateral_staked(&self) -> i64 {
        self.collateral_staked
    }

    pub fn has_deposited_collateral(&self) -> bool {
        self.has_deposited_collateral
    }

    pub fn has_contributed_this_cycle(&self) -> bool {
        self.has_contributed_this_cycle
    }

    pub fn has_bid_this_cycle(&self) -> bool {
        self.has_bid_this_cycle
    }

    pub fn has_received_payout(&self) -> bool {
        self.has_received_payout
    }

    pub fn eligible_for_payout(&self) -> bool {
        self.eligible_for_payout
    }

    pub fn status(&self) -> MemberStatus {
        self.status
    }

    pub fn last_contribution_timestamp(&self) -> Option<u64> {
        self.last_contribution_timestamp
    }

    pub fn missed_contributions(&self) -> u8 {
        self.missed_contributions
    }

    pub fn payout_amount(&self) -> Option<i64> {
        self.payout_amount
    }

    pub fn is_defaulted(&self) -> bool {
        self.status == MemberStatus::Defaulted
    }

    /// Can still be chosen as a cycle recipient
    pub fn can_receive(&self) -> bool {
        !self.has_received_payout && !self.is_defaulted()
    }

    pub(crate) fn record_contribution(&mut self, amount: i64, now: u64) {
        self.contributions_made += 1;
        self.total_contributed += amount;
        self.has_contributed_this_cycle = true;
        self.last_contribution_timestamp = Some(now);
    }

    pub(crate) fn mark_bid(&mut self) {
        self.has_bid_this_cycle = true;
    }

    pub(crate) fn stake(&mut self, amount: i64) {
        self.collateral_staked += amount;
        self.has_deposited_collateral = true;
    }

    /// Remove up to `amount` from the stake; returns what was removed
    pub(crate) fn unstake(&mut self, amount: i64) -> i64 {
        let taken = amount.min(self.collateral_staked);
        self.collateral_staked -= taken;
        taken
    }

    pub(crate) fn record_miss(&mut self) {
        self.missed_contributions += 1;
    }

    /// Status change for a miss; paid members keep their standing
    pub(crate) fn downgrade(&mut self, status: MemberStatus) {
        if self.has_received_payout {
            return;
        }
        if self.status == MemberStatus::Defaulted {
            return;
        }
        self.status = status;
        if status == MemberStatus::Defaulted {
            self.eligible_for_payout = false;
        }
    }

    pub(crate) fn set_eligible(&mut self, eligible: bool) {
        self.eligible_for_payout = eligible;
    }

    pub(crate) fn mark_paid(&mut self, net_amount: i64) {
        debug_assert!(!self.has_received_payout, "member paid twice");
        self.has_received_payout = true;
        self.eligible_for_payout = false;
        self.payout_amount = Some(net_amount);
    }

    pub(crate) fn mark_withdrawn(&mut self) {
        self.status = MemberStatus::Withdrawn;
    }

    pub(crate) fn reset_cycle_flags(&mut self) {
        self.has_contributed_this_cycle = false;
        self.has_bid_this_cycle = false;
    }
}
