//! Cycle and collateral operations
//!
//! Contribution, bidding, the three settlement entry points (timed advance,
//! creator override, winner claim), early payout, and collateral
//! deposit/withdrawal.

use crate::constants::MIN_BID;
use crate::core::address::PoolId;
use crate::error::{EngineError, RoundViolation};
use crate::models::event::Event;
use crate::models::pool::{CyclePhase, PayoutMode, PoolStatus};
use crate::models::registry::ProtocolRegistry;
use crate::orchestrator::engine::SettlementEngine;
use crate::settlement::cycle::{
    all_contributed, can_win_bid, close_bidding, finish_cycle, pay_early, settle_cycle,
};
use crate::settlement::tx::PoolTx;
use tracing::info;

/// Pool must be active and settling the cycle the caller expects
fn require_cycle(tx: &PoolTx, expected_cycle: u8) -> Result<(), EngineError> {
    let pool = &tx.bundle.pool;
    if !pool.status().is_active() {
        return Err(EngineError::PoolNotActive);
    }
    if pool.current_cycle() != expected_cycle {
        return Err(EngineError::InvalidRound(RoundViolation::OutOfOrder {
            requested: expected_cycle,
            current: pool.current_cycle(),
        }));
    }
    Ok(())
}

impl SettlementEngine {
    /// Pay this cycle's contribution (exact amount only)
    pub fn contribute(
        &mut self,
        pool_id: &PoolId,
        member: &str,
        amount: i64,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, wallets| {
            let pool = &tx.bundle.pool;
            if !pool.status().is_active() {
                return Err(EngineError::PoolNotActive);
            }
            let record = tx
                .bundle
                .member(member)
                .ok_or_else(|| EngineError::NotParticipant(member.to_string()))?;
            if record.has_contributed_this_cycle() {
                return Err(EngineError::AlreadyContributed(member.to_string()));
            }
            let expected = pool.config().contribution_amount;
            if amount != expected {
                return Err(EngineError::IncorrectContributionAmount {
                    expected,
                    actual: amount,
                });
            }
            tx.debit_wallet(wallets, member, amount)?;

            let cycle = tx.bundle.pool.current_cycle();
            tx.bundle.vault.deposit_contribution(amount);
            tx.bundle.pool.add_contribution(amount);
            tx.bundle.member_mut(member)?.record_contribution(amount, now);

            let pool_id = tx.pool_id();
            info!(pool = %pool_id, cycle, member, amount, "contribution recorded");
            tx.emit(Event::Contribution {
                at: now,
                pool_id,
                member: member.to_string(),
                amount,
                cycle,
            });

            // Predetermined pools have nothing to bid on and start collecting
            if tx.bundle.pool.phase() == Some(CyclePhase::Bidding)
                && tx.bundle.pool.config().payout_mode == PayoutMode::Predetermined
            {
                tx.bundle.pool.set_phase(CyclePhase::Contributing, now);
            }
            if tx.bundle.pool.phase() == Some(CyclePhase::Contributing) && all_contributed(&tx.bundle)
            {
                tx.bundle.pool.set_phase(CyclePhase::ReadyForPayout, now);
                info!(pool = %pool_id, cycle, "pot complete, ready for payout");
            }
            Ok(())
        })
    }

    /// Offer a discount on this cycle's pot
    pub fn place_bid(
        &mut self,
        pool_id: &PoolId,
        member: &str,
        amount: i64,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            let pool = &tx.bundle.pool;
            if !pool.status().is_active() {
                return Err(EngineError::PoolNotActive);
            }
            if pool.config().payout_mode != PayoutMode::Bidding
                || pool.phase() != Some(CyclePhase::Bidding)
            {
                return Err(EngineError::InvalidPhase);
            }
            let record = tx
                .bundle
                .member(member)
                .ok_or_else(|| EngineError::NotParticipant(member.to_string()))?;
            if record.has_received_payout() {
                return Err(EngineError::AlreadyReceivedPayout(member.to_string()));
            }
            if record.is_defaulted() {
                return Err(EngineError::NotEligibleForPayout(member.to_string()));
            }
            if !can_win_bid(&tx.bundle, member) {
                return Err(EngineError::InsufficientCollateral {
                    staked: record.collateral_staked(),
                    required: pool.config().required_collateral(),
                });
            }
            if tx.bundle.bids.has_bid(member) {
                return Err(EngineError::AlreadyBid(member.to_string()));
            }
            if amount < MIN_BID {
                return Err(EngineError::BidTooLow {
                    amount,
                    min: MIN_BID,
                });
            }
            let pot = pool.config().pot_size();
            if amount >= pot {
                return Err(EngineError::BidTooHigh { amount, pot });
            }

            tx.bundle.bids.place(member, amount);
            tx.bundle.member_mut(member)?.mark_bid();
            let leading = tx
                .bundle
                .pool
                .current_bid_amount()
                .map_or(true, |best| amount > best);
            if leading {
                tx.bundle
                    .pool
                    .set_winner(Some(member.to_string()), Some(amount));
            }

            let pool_id = tx.pool_id();
            let cycle = tx.bundle.pool.current_cycle();
            info!(pool = %pool_id, cycle, member, amount, leading, "bid placed");
            tx.emit(Event::BidPlaced {
                at: now,
                pool_id,
                bidder: member.to_string(),
                amount,
                cycle,
            });
            Ok(())
        })
    }

    /// End the bidding round
    ///
    /// The creator may close at any time; other members only once every
    /// member able to win has bid.
    pub fn close_bidding(&mut self, pool_id: &PoolId, caller: &str, now: u64) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            let bundle = &tx.bundle;
            if !bundle.pool.status().is_active() {
                return Err(EngineError::PoolNotActive);
            }
            if bundle.pool.config().payout_mode != PayoutMode::Bidding
                || bundle.pool.phase() != Some(CyclePhase::Bidding)
            {
                return Err(EngineError::InvalidPhase);
            }
            if !bundle.pool.is_member(caller) {
                return Err(EngineError::NotParticipant(caller.to_string()));
            }
            if !bundle.pool.is_creator(caller) {
                let pending = bundle
                    .members_in_order()
                    .filter(|m| can_win_bid(bundle, m.owner()) && !bundle.bids.has_bid(m.owner()))
                    .count();
                if pending > 0 {
                    return Err(EngineError::BiddingStillOpen { pending });
                }
            }
            close_bidding(tx)
        })
    }

    /// Settle the cycle once its window has elapsed (anyone may call)
    pub fn advance_cycle(
        &mut self,
        registry: &ProtocolRegistry,
        pool_id: &PoolId,
        caller: &str,
        expected_cycle: u8,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            require_cycle(tx, expected_cycle)?;
            let window = tx.bundle.pool.window().ok_or(EngineError::PoolNotActive)?;
            if !window.can_settle(now) {
                return Err(EngineError::InvalidRound(RoundViolation::TooEarly {
                    retry_at: window.settle_available_at(),
                }));
            }
            info!(pool = %tx.pool_id(), cycle = expected_cycle, caller, "advancing cycle");
            settle_cycle(tx, registry, false)
        })
    }

    /// Settle the cycle immediately (creator only)
    pub fn force_advance_cycle(
        &mut self,
        registry: &ProtocolRegistry,
        pool_id: &PoolId,
        caller: &str,
        expected_cycle: u8,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            if !tx.bundle.pool.is_creator(caller) {
                return Err(EngineError::NotPoolCreator);
            }
            require_cycle(tx, expected_cycle)?;
            info!(pool = %tx.pool_id(), cycle = expected_cycle, "forcing cycle advance");
            settle_cycle(tx, registry, true)
        })
    }

    /// Winner claims the full pot once the payout delay has passed
    pub fn process_payout(
        &mut self,
        registry: &ProtocolRegistry,
        pool_id: &PoolId,
        member: &str,
        expected_cycle: u8,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            require_cycle(tx, expected_cycle)?;
            let pool = &tx.bundle.pool;
            if pool.phase() != Some(CyclePhase::ReadyForPayout) {
                return Err(EngineError::InvalidPhase);
            }
            if pool.current_winner() != Some(member) {
                return Err(EngineError::NotRoundWinner(member.to_string()));
            }
            let retry_at = pool
                .window()
                .and_then(|w| w.payout_available_at())
                .ok_or(EngineError::InvalidPhase)?;
            if now < retry_at {
                return Err(EngineError::InvalidRound(RoundViolation::TooEarly { retry_at }));
            }
            settle_cycle(tx, registry, false)
        })
    }

    /// Take this cycle's pot ahead of turn against staked collateral
    pub fn request_early_payout(
        &mut self,
        registry: &ProtocolRegistry,
        pool_id: &PoolId,
        member: &str,
        expected_cycle: u8,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            require_cycle(tx, expected_cycle)?;
            let pool = &tx.bundle.pool;
            if pool.phase() != Some(CyclePhase::ReadyForPayout) {
                return Err(EngineError::InvalidPhase);
            }
            let record = tx
                .bundle
                .member(member)
                .ok_or_else(|| EngineError::NotParticipant(member.to_string()))?;
            if record.has_received_payout() {
                return Err(EngineError::AlreadyReceivedPayout(member.to_string()));
            }
            if record.is_defaulted() || pool.current_winner() == Some(member) {
                return Err(EngineError::NotEligibleForPayout(member.to_string()));
            }
            let required = pool.config().required_collateral();
            if record.collateral_staked() < required {
                return Err(EngineError::InsufficientCollateral {
                    staked: record.collateral_staked(),
                    required,
                });
            }

            pay_early(tx, registry, member)?;
            finish_cycle(tx, false)
        })
    }

    /// Stake collateral; the resulting stake must meet the requirement
    pub fn deposit_collateral(
        &mut self,
        pool_id: &PoolId,
        member: &str,
        amount: i64,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, wallets| {
            let pool = &tx.bundle.pool;
            if pool.status() == PoolStatus::Completed {
                return Err(EngineError::PoolNotActive);
            }
            let record = tx
                .bundle
                .member(member)
                .ok_or_else(|| EngineError::NotParticipant(member.to_string()))?;
            if amount <= 0 {
                return Err(EngineError::NonPositiveAmount(amount));
            }
            let required = pool.config().required_collateral();
            let resulting = record.collateral_staked() + amount;
            if resulting < required {
                return Err(EngineError::InsufficientCollateralAmount { resulting, required });
            }
            tx.debit_wallet(wallets, member, amount)?;

            tx.bundle.vault.deposit_collateral(amount);
            tx.bundle.member_mut(member)?.stake(amount);

            let pool_id = tx.pool_id();
            info!(pool = %pool_id, member, amount, new_total = resulting, "collateral deposited");
            tx.emit(Event::CollateralDeposited {
                at: now,
                pool_id,
                member: member.to_string(),
                amount,
                new_total: resulting,
            });
            Ok(())
        })
    }

    /// Return the full stake once the member's obligations are met
    pub fn withdraw_collateral(&mut self, pool_id: &PoolId, member: &str, now: u64) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            let pool = &tx.bundle.pool;
            let record = tx
                .bundle
                .member(member)
                .ok_or_else(|| EngineError::NotParticipant(member.to_string()))?;
            if record.collateral_staked() == 0 {
                return Err(EngineError::InsufficientCollateral {
                    staked: 0,
                    required: pool.config().required_collateral(),
                });
            }
            let obligations_met = pool.status() == PoolStatus::Completed
                || record.contributions_made() >= pool.total_cycles();
            if !obligations_met {
                return Err(EngineError::NotEligibleForPayout(member.to_string()));
            }

            let staked = record.collateral_staked();
            let amount = tx.bundle.member_mut(member)?.unstake(staked);
            tx.release_collateral(member, amount)?;

            let pool_id = tx.pool_id();
            info!(pool = %pool_id, member, amount, "collateral withdrawn");
            tx.emit(Event::CollateralWithdrawn {
                at: now,
                pool_id,
                member: member.to_string(),
                amount,
            });
            Ok(())
        })
    }
}
