//! Fee and payout arithmetic
//!
//! All results are floored integers. Every split is exact: the parts always
//! sum back to the input, so no amount is created or lost to rounding.

use crate::constants::BPS_DIVISOR;

/// `floor(amount × bps / 10000)`, widened to avoid overflow
///
/// ```
/// use rosca_core_rs::settlement::bps_of;
///
/// assert_eq!(bps_of(300, 100), 3);
/// assert_eq!(bps_of(99, 100), 0);
/// ```
pub fn bps_of(amount: i64, bps: u16) -> i64 {
    let scaled = i128::from(amount) * i128::from(bps) / i128::from(BPS_DIVISOR);
    scaled as i64
}

/// Regular payout: protocol fee taken from the gross
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
}

pub fn split_protocol_fee(gross: i64, fee_bps: u16) -> FeeSplit {
    let fee = bps_of(gross, fee_bps);
    FeeSplit {
        gross,
        fee,
        net: gross - fee,
    }
}

/// Early payout: protocol fee plus early-withdrawal fee, both on the gross
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlySplit {
    pub gross: i64,
    pub protocol_fee: i64,
    pub early_fee: i64,
    pub net: i64,
}

pub fn split_early_payout(gross: i64, fee_bps: u16, early_fee_bps: u16) -> EarlySplit {
    let protocol_fee = bps_of(gross, fee_bps);
    let early_fee = bps_of(gross, early_fee_bps);
    EarlySplit {
        gross,
        protocol_fee,
        early_fee,
        net: gross - protocol_fee - early_fee,
    }
}

/// Winning discount shared among the other contributors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DividendSplit {
    pub per_member: i64,
    /// `per_member × recipients`
    pub distributed: i64,
    /// Undistributable remainder; stays with the winner's gross
    pub dust: i64,
}

/// Split `discount` equally over `recipients`, never more than `pot`
///
/// With no recipients nothing is distributed.
pub fn split_dividend(discount: i64, pot: i64, recipients: usize) -> DividendSplit {
    let discount = discount.clamp(0, pot.max(0));
    if recipients == 0 {
        return DividendSplit {
            per_member: 0,
            distributed: 0,
            dust: discount,
        };
    }
    let n = recipients as i64;
    let per_member = discount / n;
    DividendSplit {
        per_member,
        distributed: per_member * n,
        dust: discount - per_member * n,
    }
}

/// Penalty on a collateral draw, capped by what is left staked
pub fn collateral_penalty(contribution: i64, penalty_bps: u16, remaining: i64) -> i64 {
    bps_of(contribution, penalty_bps).min(remaining.max(0))
}
