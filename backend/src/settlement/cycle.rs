//! Cycle settlement
//!
//! The steps that turn one cycle's pot into a payout, shared by the timed
//! advance, the creator's forced advance, the winner's claim and the early
//! payout path. Every function works on a staged [`PoolTx`]; an error from
//! any step abandons the whole transaction.
//!
//! # Settlement Flow
//!
//! ```text
//! close bidding (bidding pools, if still open)
//!   → cover missed contributions from collateral, or record defaults
//!   → resolve recipient (winner, else next unpaid member in join order)
//!   → dividends to other contributors, net to recipient, fee to treasury
//!     (or refund every contributor when nobody can receive)
//!   → reset per-cycle flags, open next cycle or complete the pool
//! ```

use crate::error::EngineError;
use crate::models::event::Event;
use crate::models::member::MemberStatus;
use crate::models::pool::{CyclePhase, PayoutMode};
use crate::models::registry::ProtocolRegistry;
use crate::models::state::PoolBundle;
use crate::settlement::fees::{
    collateral_penalty, split_dividend, split_early_payout, split_protocol_fee,
};
use crate::settlement::tx::PoolTx;
use tracing::{info, warn};

/// Every member has paid in this cycle
pub fn all_contributed(bundle: &PoolBundle) -> bool {
    bundle
        .members_in_order()
        .all(|m| m.has_contributed_this_cycle())
}

/// First member in payout order who can still be paid
pub fn next_unpaid(bundle: &PoolBundle) -> Option<String> {
    bundle
        .pool
        .payout_order()
        .iter()
        .find(|owner| bundle.member(owner).map_or(false, |m| m.can_receive()))
        .cloned()
}

/// Member may take this cycle's pot through a winning bid
///
/// Anyone other than the next unpaid member is paid out of turn and needs
/// the pool's full collateral requirement staked.
pub fn can_win_bid(bundle: &PoolBundle, owner: &str) -> bool {
    let record = match bundle.member(owner) {
        Some(record) if record.can_receive() => record,
        _ => return false,
    };
    next_unpaid(bundle).as_deref() == Some(owner)
        || record.collateral_staked() >= bundle.pool.config().required_collateral()
}

/// Recipient for the cycle being settled
///
/// The resolved winner if they are still eligible, otherwise the liveness
/// fallback.
pub fn resolve_recipient(bundle: &PoolBundle) -> Option<String> {
    if let Some(winner) = bundle.pool.current_winner() {
        if bundle.member(winner).map_or(false, |m| m.can_receive()) {
            return Some(winner.to_string());
        }
    }
    next_unpaid(bundle)
}

/// Prepare a freshly opened cycle
///
/// Predetermined pools fix their recipient now; bidding pools start with an
/// empty ledger and no winner.
pub fn open_cycle(tx: &mut PoolTx) -> Result<(), EngineError> {
    let cycle = tx.bundle.pool.current_cycle();
    tx.bundle.bids.reset(cycle);
    match tx.bundle.pool.config().payout_mode {
        PayoutMode::Predetermined => {
            let recipient = next_unpaid(&tx.bundle);
            if let Some(owner) = &recipient {
                tx.bundle.member_mut(owner)?.set_eligible(true);
            }
            tx.bundle.pool.set_winner(recipient, None);
        }
        PayoutMode::Bidding => tx.bundle.pool.set_winner(None, None),
    }
    Ok(())
}

/// Resolve the bidding round and move on to contributions
pub fn close_bidding(tx: &mut PoolTx) -> Result<(), EngineError> {
    let now = tx.now();
    let bundle = &tx.bundle;
    let best = bundle.bids.best(|who| can_win_bid(bundle, who)).cloned();

    let (winner, bid_amount) = match best {
        Some(entry) => (Some(entry.bidder), Some(entry.amount)),
        None => (next_unpaid(bundle), None),
    };

    if let Some(owner) = &winner {
        tx.bundle.bids.set_winner(owner);
        tx.bundle.member_mut(owner)?.set_eligible(true);
    }
    tx.bundle.pool.set_winner(winner.clone(), bid_amount);

    let phase = if all_contributed(&tx.bundle) {
        CyclePhase::ReadyForPayout
    } else {
        CyclePhase::Contributing
    };
    tx.bundle.pool.set_phase(phase, now);

    let pool_id = tx.pool_id();
    let cycle = tx.bundle.pool.current_cycle();
    info!(pool = %pool_id, cycle, winner = ?winner, bid = ?bid_amount, "bidding closed");
    tx.emit(Event::BiddingClosed {
        at: now,
        pool_id,
        cycle,
        winner,
        bid_amount,
    });
    Ok(())
}

/// Settle every member who has not paid in this cycle
///
/// Enough collateral covers the contribution and pays a penalty to the
/// treasury. Otherwise the miss is recorded, an unpaid member defaults, and
/// whatever stake is left goes to the treasury.
pub fn cover_missed_contributions(
    tx: &mut PoolTx,
    registry: &ProtocolRegistry,
) -> Result<(), EngineError> {
    let now = tx.now();
    let pool_id = tx.pool_id();
    let cycle = tx.bundle.pool.current_cycle();
    let contribution = tx.bundle.pool.config().contribution_amount;
    let owners = tx.bundle.pool.members().to_vec();

    for owner in owners {
        let record = tx.bundle.member_mut(&owner)?;
        if record.has_contributed_this_cycle() {
            continue;
        }

        if record.collateral_staked() >= contribution {
            record.unstake(contribution);
            record.record_contribution(contribution, now);
            record.downgrade(MemberStatus::Late);
            let penalty =
                collateral_penalty(contribution, registry.penalty_bps(), record.collateral_staked());
            record.unstake(penalty);

            tx.collateral_to_pot(contribution)
                .map_err(EngineError::InsufficientPoolFunds)?;
            tx.bundle.pool.add_contribution(contribution);
            tx.release_collateral(registry.treasury(), penalty)?;

            warn!(pool = %pool_id, cycle, member = %owner, penalty, "missed contribution covered by collateral");
            tx.emit(Event::CollateralDrawn {
                at: now,
                pool_id,
                member: owner,
                cycle,
                amount: contribution,
                penalty,
            });
        } else {
            record.record_miss();
            record.downgrade(MemberStatus::Defaulted);
            let staked = record.collateral_staked();
            let forfeited = record.unstake(staked);
            tx.release_collateral(registry.treasury(), forfeited)?;

            warn!(pool = %pool_id, cycle, member = %owner, forfeited, "missed contribution without collateral");
            tx.emit(Event::ContributionMissed {
                at: now,
                pool_id,
                member: owner.clone(),
                cycle,
            });
            if forfeited > 0 {
                tx.emit(Event::CollateralForfeited {
                    at: now,
                    pool_id,
                    member: owner,
                    cycle,
                    amount: forfeited,
                });
            }
        }
    }
    Ok(())
}

/// Pay the pot to `recipient`, less the bid discount and protocol fee
pub fn pay_recipient(
    tx: &mut PoolTx,
    registry: &ProtocolRegistry,
    recipient: &str,
) -> Result<(), EngineError> {
    let now = tx.now();
    let pool_id = tx.pool_id();
    let cycle = tx.bundle.pool.current_cycle();
    let pot = tx.bundle.pool.total_contributions();

    let discount = if tx.bundle.pool.current_winner() == Some(recipient) {
        tx.bundle.pool.current_bid_amount().unwrap_or(0)
    } else {
        0
    };
    let others: Vec<String> = tx
        .bundle
        .members_in_order()
        .filter(|m| m.owner() != recipient && m.has_contributed_this_cycle())
        .map(|m| m.owner().to_string())
        .collect();
    let dividend = split_dividend(discount, pot, others.len());

    if dividend.per_member > 0 {
        for member in others {
            tx.disburse(&member, dividend.per_member)?;
            tx.emit(Event::DividendPaid {
                at: now,
                pool_id,
                cycle,
                member,
                amount: dividend.per_member,
            });
        }
    }

    let split = split_protocol_fee(pot - dividend.distributed, registry.fee_bps());
    tx.disburse(recipient, split.net)?;
    tx.route_fee(registry.treasury(), split.fee)?;
    tx.bundle.pool.take_contributions(pot);
    tx.bundle.member_mut(recipient)?.mark_paid(split.net);

    info!(
        pool = %pool_id,
        cycle,
        recipient,
        gross = split.gross,
        fee = split.fee,
        net = split.net,
        "payout settled"
    );
    tx.emit(Event::PayoutSettled {
        at: now,
        pool_id,
        cycle,
        recipient: recipient.to_string(),
        gross: split.gross,
        fee: split.fee,
        net: split.net,
    });
    Ok(())
}

/// Return each contributor's payment when nobody can receive the pot
pub fn refund_cycle(tx: &mut PoolTx) -> Result<(), EngineError> {
    let now = tx.now();
    let pool_id = tx.pool_id();
    let cycle = tx.bundle.pool.current_cycle();
    let contribution = tx.bundle.pool.config().contribution_amount;
    let contributors: Vec<String> = tx
        .bundle
        .members_in_order()
        .filter(|m| m.has_contributed_this_cycle())
        .map(|m| m.owner().to_string())
        .collect();

    let mut total = 0;
    for member in &contributors {
        tx.disburse(member, contribution)?;
        total += contribution;
    }
    tx.bundle.pool.take_contributions(total);

    warn!(pool = %pool_id, cycle, total, "no eligible recipient, cycle refunded");
    tx.emit(Event::CycleRefunded {
        at: now,
        pool_id,
        cycle,
        total,
    });
    Ok(())
}

/// Pay the full pot to `member` ahead of turn and mark them withdrawn
pub fn pay_early(
    tx: &mut PoolTx,
    registry: &ProtocolRegistry,
    member: &str,
) -> Result<(), EngineError> {
    let now = tx.now();
    let pool_id = tx.pool_id();
    let cycle = tx.bundle.pool.current_cycle();
    let pot = tx.bundle.pool.total_contributions();
    let early_fee_bps = tx.bundle.pool.config().early_withdrawal_fee_bps;

    let split = split_early_payout(pot, registry.fee_bps(), early_fee_bps);
    tx.disburse(member, split.net)?;
    tx.route_fee(registry.treasury(), split.protocol_fee)?;
    tx.route_fee(registry.treasury(), split.early_fee)?;
    tx.bundle.pool.take_contributions(pot);

    let record = tx.bundle.member_mut(member)?;
    record.mark_paid(split.net);
    record.mark_withdrawn();

    info!(
        pool = %pool_id,
        cycle,
        member,
        net = split.net,
        early_fee = split.early_fee,
        "early payout settled"
    );
    tx.emit(Event::EarlyPayout {
        at: now,
        pool_id,
        cycle,
        member: member.to_string(),
        gross: split.gross,
        protocol_fee: split.protocol_fee,
        early_fee: split.early_fee,
        net: split.net,
    });
    Ok(())
}

/// Reset per-cycle state and open the next cycle or complete the pool
pub fn finish_cycle(tx: &mut PoolTx, forced: bool) -> Result<(), EngineError> {
    let now = tx.now();
    let pool_id = tx.pool_id();
    for record in tx.bundle.members.values_mut() {
        record.reset_cycle_flags();
        if !record.has_received_payout() {
            record.set_eligible(false);
        }
    }

    let completed = tx.bundle.pool.finish_cycle(now);
    let cycle = tx.bundle.pool.current_cycle();
    tx.emit(Event::CycleAdvanced {
        at: now,
        pool_id,
        cycle,
        forced,
    });

    if completed {
        tx.bundle.bids.reset(cycle);
        info!(pool = %pool_id, "pool completed");
        tx.emit(Event::PoolCompleted { at: now, pool_id });
        return Ok(());
    }
    info!(pool = %pool_id, cycle, forced, "cycle advanced");
    open_cycle(tx)
}

/// Full settlement of the cycle in progress
pub fn settle_cycle(
    tx: &mut PoolTx,
    registry: &ProtocolRegistry,
    forced: bool,
) -> Result<(), EngineError> {
    let pool = &tx.bundle.pool;
    if pool.config().payout_mode == PayoutMode::Bidding && pool.phase() == Some(CyclePhase::Bidding) {
        close_bidding(tx)?;
    }
    cover_missed_contributions(tx, registry)?;
    match resolve_recipient(&tx.bundle) {
        Some(recipient) => pay_recipient(tx, registry, &recipient)?,
        None => refund_cycle(tx)?,
    }
    finish_cycle(tx, forced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::PoolId;
    use crate::models::bid::BidState;
    use crate::models::member::MemberRecord;
    use crate::models::pool::{Asset, Pool, PoolConfig};
    use crate::models::vault::Vault;
    use std::collections::BTreeMap;

    fn bidding_bundle() -> PoolBundle {
        let pool_id: PoolId = "POOL01".parse().unwrap();
        let config = PoolConfig {
            payout_mode: PayoutMode::Bidding,
            ..Default::default()
        };
        let mut pool = Pool::new(pool_id, "alice", Asset::Native, config, vec![], 0);
        pool.add_member("bob");
        pool.add_member("carol");
        pool.activate(0);
        let members: BTreeMap<_, _> = ["alice", "bob", "carol"]
            .into_iter()
            .map(|owner| (owner.to_string(), MemberRecord::new(owner, pool_id)))
            .collect();
        PoolBundle {
            pool,
            members,
            bids: BidState::new(pool_id, 0),
            vault: Vault::new(pool_id, Asset::Native),
        }
    }

    #[test]
    fn test_out_of_turn_winner_needs_stake() {
        let mut bundle = bidding_bundle();
        assert!(can_win_bid(&bundle, "alice"));
        assert!(!can_win_bid(&bundle, "bob"));
        assert!(!can_win_bid(&bundle, "mallory"));

        bundle.members.get_mut("bob").unwrap().stake(199);
        assert!(!can_win_bid(&bundle, "bob"));
        bundle.members.get_mut("bob").unwrap().stake(1);
        assert!(can_win_bid(&bundle, "bob"));
    }

    #[test]
    fn test_close_bidding_passes_over_short_stake() {
        let mut bundle = bidding_bundle();
        bundle.members.get_mut("carol").unwrap().stake(200);
        bundle.bids.place("carol", 60);
        bundle.bids.place("bob", 40);
        bundle.members.get_mut("carol").unwrap().unstake(150);

        let mut tx = PoolTx::with_bundle(bundle, 5);
        close_bidding(&mut tx).unwrap();
        assert_eq!(tx.bundle.pool.current_winner(), Some("alice"));
        assert_eq!(tx.bundle.pool.current_bid_amount(), None);
        assert_eq!(tx.bundle.pool.phase(), Some(CyclePhase::Contributing));
    }
}
