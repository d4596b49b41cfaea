//! Protocol limits and derivation seeds
//!
//! CRITICAL: All money values are i64 (minor units), all durations are
//! seconds, all rates are basis points.

/// 100% in basis points
pub const BPS_DIVISOR: i64 = 10_000;

pub const MIN_PARTICIPANTS: u8 = 3;
pub const MAX_PARTICIPANTS: u8 = 20;

pub const MIN_CONTRIBUTION: i64 = 10;
pub const MAX_CONTRIBUTION: i64 = 10_000;

pub const DAY_SECONDS: u64 = 24 * 60 * 60;
pub const MIN_CYCLE_DURATION: u64 = 3 * DAY_SECONDS;
pub const MAX_CYCLE_DURATION: u64 = 28 * DAY_SECONDS;
pub const MAX_PAYOUT_DELAY: u64 = 7 * DAY_SECONDS;

pub const DEFAULT_EARLY_WITHDRAWAL_FEE_BPS: u16 = 200;
pub const MAX_EARLY_WITHDRAWAL_FEE_BPS: u16 = 1_000;

pub const DEFAULT_COLLATERAL_BPS: u16 = 20_000;
pub const MIN_COLLATERAL_BPS: u16 = 10_000;

pub const MAX_PROTOCOL_FEE_BPS: u16 = 1_000;
pub const DEFAULT_PENALTY_BPS: u16 = 500;

/// Smallest discount a bidder may offer
pub const MIN_BID: i64 = 1;

// Address derivation seeds
pub const POOL_SEED: &[u8] = b"rosca-pool";
pub const MEMBER_SEED: &[u8] = b"rosca-member";
pub const VAULT_SEED: &[u8] = b"rosca-vault";
pub const BID_STATE_SEED: &[u8] = b"rosca-bid-state";
