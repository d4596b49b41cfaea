//! Rotating Savings Core - Rust Engine
//!
//! Pool lifecycle and cycle-settlement engine for rotating savings and
//! credit associations: a fixed group pays in every cycle and one member
//! takes the pot, until everyone has been paid once.
//!
//! # Architecture
//!
//! - **core**: Cycle timing and deterministic record addressing
//! - **models**: Domain types (Pool, MemberRecord, BidState, Vault, wallets, events)
//! - **settlement**: Fee arithmetic, staged transfers, cycle settlement steps
//! - **orchestrator**: The settlement engine and checkpointing
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (minor units)
//! 2. Every operation commits fully or not at all
//! 3. Every vault balances against its members' records after each commit
//! 4. Time is always supplied by the caller

// Module declarations
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod settlement;

// Re-exports for convenience
pub use crate::core::address::{Address, PoolId, PoolIdError};
pub use crate::core::time::CycleWindow;
pub use error::{EngineError, ErrorCategory, RoundViolation};
pub use models::{
    Asset, BidEntry, BidState, CyclePhase, Event, EventLog, LedgerState, MemberRecord,
    MemberStatus, NewPool, PayoutMode, Pool, PoolConfig, PoolStatus, ProtocolRegistry, Vault,
    VaultError, Wallet, WalletBook, WalletError,
};
pub use orchestrator::{EngineSnapshot, PoolSummary, SettlementEngine};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn rosca_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::engine::PyEngine>()?;
    Ok(())
}
