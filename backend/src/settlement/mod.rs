//! Settlement Module
//!
//! Money movement for a pool: fee arithmetic, staged wallet transfers and
//! the per-cycle settlement steps.
//!
//! # Critical Invariants
//!
//! 1. **Atomicity**: an operation commits its vault, member and wallet
//!    changes together, or none of them
//! 2. **Conservation**: after every commit the vault holds exactly what
//!    members paid in and staked, less what was paid out and routed as fees
//! 3. **Exactly-once payout**: a member is paid at most once per pool
//!
//! # Example
//!
//! ```rust
//! use rosca_core_rs::settlement::split_protocol_fee;
//!
//! let split = split_protocol_fee(300, 100);
//! assert_eq!(split.net, 297);
//! assert_eq!(split.fee, 3);
//! ```

pub mod cycle;
pub mod fees;
pub mod tx;

pub use fees::{
    bps_of, collateral_penalty, split_dividend, split_early_payout, split_protocol_fee,
    DividendSplit, EarlySplit, FeeSplit,
};
pub use tx::PoolTx;
