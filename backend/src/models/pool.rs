//! Pool model
//!
//! One rotating-savings circle: configuration, membership, payout order,
//! cycle counters and the status state machine.
//!
//! ```text
//! Initializing ──(last seat filled)──> Active{Bidding | Contributing}
//! Active{Bidding} ──(close bidding)──> Active{Contributing | ReadyForPayout}
//! Active{Contributing} ──(pot full)──> Active{ReadyForPayout}
//! Active{*} ──(settle)──> Active{opening phase} | Completed
//! ```
//!
//! # Critical Invariants
//!
//! 1. `members.len() <= max_participants`
//! 2. `status == Active ⇒ members.len() == max_participants`
//! 3. `current_cycle < total_cycles` while Active
//! 4. The creator is always the first member

use crate::constants::*;
use crate::core::address::PoolId;
use crate::core::time::CycleWindow;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Phase within an active cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Members submit discount bids for this cycle's pot
    Bidding,
    /// Members pay in this cycle's contribution
    Contributing,
    /// Pot is full; the recipient can claim
    ReadyForPayout,
}

/// Pool lifecycle status
///
/// The phase only exists while the pool is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    Initializing,
    Active { phase: CyclePhase },
    Completed,
}

impl PoolStatus {
    pub fn phase(&self) -> Option<CyclePhase> {
        match self {
            PoolStatus::Active { phase } => Some(*phase),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PoolStatus::Active { .. })
    }
}

/// How each cycle's recipient is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutMode {
    /// Recipients follow join order
    Predetermined,
    /// Highest discount bid wins each cycle
    Bidding,
}

impl PayoutMode {
    /// Phase cycles after the first open in; cycle 0 always opens in bidding
    pub fn opening_phase(self) -> CyclePhase {
        match self {
            PayoutMode::Predetermined => CyclePhase::Contributing,
            PayoutMode::Bidding => CyclePhase::Bidding,
        }
    }
}

/// Asset a pool is denominated in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
    Native,
    Token(String),
}

/// Pool configuration supplied at creation
///
/// Defaults: 3 participants, contribution 100, 3-day cycles, 1-day payout
/// delay, 2% early withdrawal fee, 200% collateral, predetermined order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_participants: u8,
    /// Exact amount each member pays per cycle (minor units)
    pub contribution_amount: i64,
    /// Seconds per cycle
    pub cycle_duration: u64,
    /// Seconds between the pot filling and the winner's claim opening
    pub payout_delay: u64,
    pub early_withdrawal_fee_bps: u16,
    /// Collateral required for an early payout, in bps of one contribution
    pub collateral_requirement_bps: u16,
    pub payout_mode: PayoutMode,
    pub is_private: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_participants: MIN_PARTICIPANTS,
            contribution_amount: 100,
            cycle_duration: MIN_CYCLE_DURATION,
            payout_delay: DAY_SECONDS,
            early_withdrawal_fee_bps: DEFAULT_EARLY_WITHDRAWAL_FEE_BPS,
            collateral_requirement_bps: DEFAULT_COLLATERAL_BPS,
            payout_mode: PayoutMode::Predetermined,
            is_private: false,
        }
    }
}

impl PoolConfig {
    /// Reject any out-of-range parameter. Values are never clamped.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&self.max_participants) {
            return Err(EngineError::InvalidParticipantCount(self.max_participants));
        }
        if self.contribution_amount < MIN_CONTRIBUTION {
            return Err(EngineError::ContributionTooSmall {
                amount: self.contribution_amount,
                min: MIN_CONTRIBUTION,
            });
        }
        if self.contribution_amount > MAX_CONTRIBUTION {
            return Err(EngineError::ContributionTooLarge {
                amount: self.contribution_amount,
                max: MAX_CONTRIBUTION,
            });
        }
        if self.cycle_duration < MIN_CYCLE_DURATION {
            return Err(EngineError::CycleDurationTooShort {
                duration: self.cycle_duration,
                min: MIN_CYCLE_DURATION,
            });
        }
        if self.cycle_duration > MAX_CYCLE_DURATION {
            return Err(EngineError::CycleDurationTooLong {
                duration: self.cycle_duration,
                max: MAX_CYCLE_DURATION,
            });
        }
        if self.payout_delay > MAX_PAYOUT_DELAY {
            return Err(EngineError::PayoutDelayTooLong {
                delay: self.payout_delay,
                max: MAX_PAYOUT_DELAY,
            });
        }
        if self.early_withdrawal_fee_bps > MAX_EARLY_WITHDRAWAL_FEE_BPS {
            return Err(EngineError::EarlyWithdrawalFeeTooHigh {
                bps: self.early_withdrawal_fee_bps,
                max: MAX_EARLY_WITHDRAWAL_FEE_BPS,
            });
        }
        if self.collateral_requirement_bps < MIN_COLLATERAL_BPS {
            return Err(EngineError::CollateralRequirementTooLow {
                bps: self.collateral_requirement_bps,
                min: MIN_COLLATERAL_BPS,
            });
        }
        Ok(())
    }

    /// Full pot when every seat contributes
    pub fn pot_size(&self) -> i64 {
        self.contribution_amount * i64::from(self.max_participants)
    }

    /// Collateral a member must stake before taking an early payout
    pub fn required_collateral(&self) -> i64 {
        self.contribution_amount * i64::from(self.collateral_requirement_bps) / BPS_DIVISOR
    }
}

/// Everything a creator supplies to open a pool
///
/// `id` is generated when absent. `whitelist` only matters for private
/// pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPool {
    #[serde(default)]
    pub id: Option<PoolId>,
    #[serde(default = "NewPool::native")]
    pub asset: Asset,
    #[serde(default)]
    pub config: PoolConfig,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl Default for NewPool {
    fn default() -> Self {
        Self::with_config(PoolConfig::default())
    }
}

impl NewPool {
    fn native() -> Asset {
        Asset::Native
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            id: None,
            asset: Asset::Native,
            config,
            whitelist: Vec::new(),
        }
    }

    pub fn id(mut self, id: PoolId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn whitelist<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = members.into_iter().map(Into::into).collect();
        self
    }
}

/// A rotating-savings pool (aggregate root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    id: PoolId,
    creator: String,
    asset: Asset,
    config: PoolConfig,
    whitelist: Vec<String>,
    /// Join order; the creator is first
    members: Vec<String>,
    /// Fixed at activation
    payout_order: Vec<String>,
    current_cycle: u8,
    total_cycles: u8,
    status: PoolStatus,
    /// Uncommitted pot for the cycle in progress
    total_contributions: i64,
    current_winner: Option<String>,
    current_bid_amount: Option<i64>,
    /// None until activation
    window: Option<CycleWindow>,
    frozen: bool,
    created_at: u64,
}

impl Pool {
    /// Create a pool in `Initializing` with the creator seated first
    pub fn new(
        id: PoolId,
        creator: &str,
        asset: Asset,
        config: PoolConfig,
        whitelist: Vec<String>,
        created_at: u64,
    ) -> Self {
        let total_cycles = config.max_participants;
        Self {
            id,
            creator: creator.to_string(),
            asset,
            config,
            whitelist,
            members: vec![creator.to_string()],
            payout_order: Vec::new(),
            current_cycle: 0,
            total_cycles,
            status: PoolStatus::Initializing,
            total_contributions: 0,
            current_winner: None,
            current_bid_amount: None,
            window: None,
            frozen: false,
            created_at,
        }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn is_creator(&self, who: &str) -> bool {
        self.creator == who
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn payout_order(&self) -> &[String] {
        &self.payout_order
    }

    pub fn current_cycle(&self) -> u8 {
        self.current_cycle
    }

    pub fn total_cycles(&self) -> u8 {
        self.total_cycles
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    pub fn phase(&self) -> Option<CyclePhase> {
        self.status.phase()
    }

    pub fn total_contributions(&self) -> i64 {
        self.total_contributions
    }

    pub fn current_winner(&self) -> Option<&str> {
        self.current_winner.as_deref()
    }

    pub fn current_bid_amount(&self) -> Option<i64> {
        self.current_bid_amount
    }

    pub fn window(&self) -> Option<&CycleWindow> {
        self.window.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_member(&self, who: &str) -> bool {
        self.members.iter().any(|m| m == who)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= usize::from(self.config.max_participants)
    }

    /// Whether `who` may join a private pool
    pub fn is_whitelisted(&self, who: &str) -> bool {
        !self.config.is_private || self.is_creator(who) || self.whitelist.iter().any(|w| w == who)
    }

    pub(crate) fn add_member(&mut self, who: &str) {
        debug_assert!(!self.is_full(), "seat added to a full pool");
        self.members.push(who.to_string());
    }

    pub(crate) fn add_to_whitelist(&mut self, who: &str) -> bool {
        if self.whitelist.iter().any(|w| w == who) {
            return false;
        }
        self.whitelist.push(who.to_string());
        true
    }

    /// Fix the payout order and open cycle 0
    pub(crate) fn activate(&mut self, now: u64) {
        self.payout_order = self.members.clone();
        self.current_cycle = 0;
        self.status = PoolStatus::Active {
            phase: CyclePhase::Bidding,
        };
        self.window = Some(CycleWindow::open(
            now,
            self.config.cycle_duration,
            self.config.payout_delay,
        ));
    }

    pub(crate) fn set_phase(&mut self, phase: CyclePhase, now: u64) {
        debug_assert!(self.status.is_active(), "phase set on inactive pool");
        self.status = PoolStatus::Active { phase };
        if phase == CyclePhase::ReadyForPayout {
            if let Some(window) = self.window.as_mut() {
                window.mark_ready(now);
            }
        }
    }

    pub(crate) fn add_contribution(&mut self, amount: i64) {
        self.total_contributions += amount;
    }

    pub(crate) fn take_contributions(&mut self, amount: i64) {
        self.total_contributions -= amount;
    }

    pub(crate) fn set_winner(&mut self, winner: Option<String>, bid_amount: Option<i64>) {
        self.current_winner = winner;
        self.current_bid_amount = bid_amount;
    }

    /// Close the current cycle; returns true when the pool completed
    pub(crate) fn finish_cycle(&mut self, now: u64) -> bool {
        self.current_cycle += 1;
        self.current_winner = None;
        self.current_bid_amount = None;
        if self.current_cycle >= self.total_cycles {
            self.status = PoolStatus::Completed;
            return true;
        }
        self.status = PoolStatus::Active {
            phase: self.config.payout_mode.opening_phase(),
        };
        if let Some(window) = self.window.as_mut() {
            window.reopen(now);
        }
        false
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(config: PoolConfig) -> Pool {
        Pool::new("POOL01".parse().unwrap(), "alice", Asset::Native, config, vec![], 0)
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_each_bound() {
        let cases = [
            PoolConfig { max_participants: 2, ..Default::default() },
            PoolConfig { max_participants: 21, ..Default::default() },
            PoolConfig { contribution_amount: 9, ..Default::default() },
            PoolConfig { contribution_amount: 10_001, ..Default::default() },
            PoolConfig { cycle_duration: MIN_CYCLE_DURATION - 1, ..Default::default() },
            PoolConfig { cycle_duration: MAX_CYCLE_DURATION + 1, ..Default::default() },
            PoolConfig { payout_delay: MAX_PAYOUT_DELAY + 1, ..Default::default() },
            PoolConfig { early_withdrawal_fee_bps: 1_001, ..Default::default() },
            PoolConfig { collateral_requirement_bps: 9_999, ..Default::default() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_required_collateral() {
        let config = PoolConfig {
            contribution_amount: 150,
            collateral_requirement_bps: 15_000,
            ..Default::default()
        };
        assert_eq!(config.required_collateral(), 225);
    }

    #[test]
    fn test_creator_is_first_member() {
        let pool = pool(PoolConfig::default());
        assert_eq!(pool.members(), ["alice".to_string()]);
        assert_eq!(pool.status(), PoolStatus::Initializing);
        assert_eq!(pool.phase(), None);
    }

    #[test]
    fn test_private_pool_whitelist() {
        let mut pool = pool(PoolConfig { is_private: true, ..Default::default() });
        assert!(pool.is_whitelisted("alice"));
        assert!(!pool.is_whitelisted("bob"));
        assert!(pool.add_to_whitelist("bob"));
        assert!(!pool.add_to_whitelist("bob"));
        assert!(pool.is_whitelisted("bob"));
    }

    #[test]
    fn test_finish_last_cycle_completes() {
        let mut pool = pool(PoolConfig::default());
        pool.add_member("bob");
        pool.add_member("carol");
        pool.activate(100);
        assert_eq!(pool.phase(), Some(CyclePhase::Bidding));
        assert!(!pool.finish_cycle(200));
        assert_eq!(pool.phase(), Some(CyclePhase::Contributing));
        assert!(!pool.finish_cycle(300));
        assert!(pool.finish_cycle(400));
        assert_eq!(pool.status(), PoolStatus::Completed);
    }

    #[test]
    fn test_bidding_pools_open_in_bidding() {
        let mut pool = pool(PoolConfig { payout_mode: PayoutMode::Bidding, ..Default::default() });
        pool.add_member("bob");
        pool.add_member("carol");
        pool.activate(0);
        assert_eq!(pool.status(), PoolStatus::Active { phase: CyclePhase::Bidding });
        assert_eq!(pool.payout_order(), pool.members());
    }
}
