//! Engine error taxonomy
//!
//! Every failure is detected before any state is mutated, so an `Err` from
//! an engine operation always means "nothing happened" (the one exception is
//! `InsufficientPoolFunds`, which also freezes the pool).

use crate::core::address::PoolId;
use crate::models::vault::VaultError;
use crate::models::wallet::WalletError;
use thiserror::Error;

/// Why a settlement request was rejected on timing or ordering grounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundViolation {
    /// Caller asked to settle a cycle other than the one in progress
    OutOfOrder { requested: u8, current: u8 },
    /// Cycle window has not elapsed yet
    TooEarly { retry_at: u64 },
}

impl std::fmt::Display for RoundViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundViolation::OutOfOrder { requested, current } => {
                write!(f, "requested cycle {}, current cycle is {}", requested, current)
            }
            RoundViolation::TooEarly { retry_at } => {
                write!(f, "cycle window still open, retry at {}", retry_at)
            }
        }
    }
}

/// Broad class of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Membership,
    Lifecycle,
    Financial,
    Authorization,
    Integrity,
}

/// Errors returned by the settlement engine
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    // Configuration
    #[error("Participant count {0} outside allowed range")]
    InvalidParticipantCount(u8),

    #[error("Contribution {amount} below minimum {min}")]
    ContributionTooSmall { amount: i64, min: i64 },

    #[error("Contribution {amount} above maximum {max}")]
    ContributionTooLarge { amount: i64, max: i64 },

    #[error("Cycle duration {duration}s below minimum {min}s")]
    CycleDurationTooShort { duration: u64, min: u64 },

    #[error("Cycle duration {duration}s above maximum {max}s")]
    CycleDurationTooLong { duration: u64, max: u64 },

    #[error("Payout delay {delay}s above maximum {max}s")]
    PayoutDelayTooLong { delay: u64, max: u64 },

    #[error("Early withdrawal fee {bps} bps above maximum {max} bps")]
    EarlyWithdrawalFeeTooHigh { bps: u16, max: u16 },

    #[error("Collateral requirement {bps} bps below minimum {min} bps")]
    CollateralRequirementTooLow { bps: u16, min: u16 },

    #[error("Protocol fee {bps} bps exceeds limit {max} bps")]
    ProtocolFeeExceedsLimit { bps: u16, max: u16 },

    #[error("Penalty {bps} bps exceeds 10000 bps")]
    PenaltyExceedsLimit { bps: u16 },

    // Membership
    #[error("Pool is full")]
    PoolFull,

    #[error("{0} is already a participant")]
    AlreadyParticipant(String),

    #[error("{0} is not a participant")]
    NotParticipant(String),

    #[error("{0} is not whitelisted for this private pool")]
    NotWhitelisted(String),

    // Lifecycle
    #[error("Pool {0} not found")]
    PoolNotFound(PoolId),

    #[error("Pool {0} already exists")]
    PoolAlreadyExists(PoolId),

    #[error("Pool is not accepting participants")]
    PoolNotAcceptingParticipants,

    #[error("Pool is not active")]
    PoolNotActive,

    #[error("Operation not allowed in the current phase")]
    InvalidPhase,

    #[error("Invalid round: {0}")]
    InvalidRound(RoundViolation),

    #[error("Pool is still active")]
    PoolStillActive,

    #[error("Pool vault still holds {balance}")]
    VaultNotEmpty { balance: i64 },

    #[error("Pool is frozen pending manual intervention")]
    PoolFrozen,

    #[error("Pool is not frozen")]
    PoolNotFrozen,

    #[error("Bidding still open: {pending} eligible members have not bid")]
    BiddingStillOpen { pending: usize },

    // Financial
    #[error("Contribution must be exactly {expected}, got {actual}")]
    IncorrectContributionAmount { expected: i64, actual: i64 },

    #[error("{0} already contributed this cycle")]
    AlreadyContributed(String),

    #[error("{0} already placed a bid this cycle")]
    AlreadyBid(String),

    #[error("Bid {amount} below minimum {min}")]
    BidTooLow { amount: i64, min: i64 },

    #[error("Bid {amount} must be below the pot of {pot}")]
    BidTooHigh { amount: i64, pot: i64 },

    #[error("Collateral {staked} below required {required}")]
    InsufficientCollateral { staked: i64, required: i64 },

    #[error("Deposit would leave collateral at {resulting}, required {required}")]
    InsufficientCollateralAmount { resulting: i64, required: i64 },

    #[error("Pool vault cannot cover disbursement: {0}")]
    InsufficientPoolFunds(VaultError),

    #[error("{0} already received a payout")]
    AlreadyReceivedPayout(String),

    #[error("{0} is not eligible for payout")]
    NotEligibleForPayout(String),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    // Authorization
    #[error("Only the pool creator may do this")]
    NotPoolCreator,

    #[error("{0} is not this cycle's recipient")]
    NotRoundWinner(String),

    #[error("Only the registry admin may do this")]
    NotRegistryAdmin,

    // Integrity
    #[error("Conservation violated for pool {pool_id}: {detail}")]
    ConservationViolated { pool_id: PoolId, detail: String },

    #[error("Snapshot rejected: {0}")]
    InvalidSnapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        use EngineError::*;
        match self {
            InvalidParticipantCount(_)
            | ContributionTooSmall { .. }
            | ContributionTooLarge { .. }
            | CycleDurationTooShort { .. }
            | CycleDurationTooLong { .. }
            | PayoutDelayTooLong { .. }
            | EarlyWithdrawalFeeTooHigh { .. }
            | CollateralRequirementTooLow { .. }
            | ProtocolFeeExceedsLimit { .. }
            | PenaltyExceedsLimit { .. } => ErrorCategory::Configuration,

            PoolFull | AlreadyParticipant(_) | NotParticipant(_) | NotWhitelisted(_) => {
                ErrorCategory::Membership
            }

            PoolNotFound(_)
            | PoolAlreadyExists(_)
            | PoolNotAcceptingParticipants
            | PoolNotActive
            | InvalidPhase
            | InvalidRound(_)
            | PoolStillActive
            | VaultNotEmpty { .. }
            | PoolFrozen
            | PoolNotFrozen
            | BiddingStillOpen { .. } => ErrorCategory::Lifecycle,

            IncorrectContributionAmount { .. }
            | AlreadyContributed(_)
            | AlreadyBid(_)
            | BidTooLow { .. }
            | BidTooHigh { .. }
            | InsufficientCollateral { .. }
            | InsufficientCollateralAmount { .. }
            | InsufficientPoolFunds(_)
            | AlreadyReceivedPayout(_)
            | NotEligibleForPayout(_)
            | NonPositiveAmount(_)
            | Wallet(_) => ErrorCategory::Financial,

            NotPoolCreator | NotRoundWinner(_) | NotRegistryAdmin => ErrorCategory::Authorization,

            ConservationViolated { .. } | InvalidSnapshot(_) | Serialization(_) => {
                ErrorCategory::Integrity
            }
        }
    }

    /// True only for timing errors the caller can retry once time passes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidRound(RoundViolation::TooEarly { .. })
        )
    }

    /// True for accounting failures that halt the pool
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientPoolFunds(_) | EngineError::ConservationViolated { .. }
        )
    }
}
