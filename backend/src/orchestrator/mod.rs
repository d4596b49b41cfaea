//! Orchestrator - the settlement engine and its persistence
//!
//! See `engine.rs` for the engine itself, `operations.rs` for the cycle and
//! collateral operations, and `checkpoint.rs` for save/restore.

pub mod checkpoint;
pub mod engine;
mod operations;

// Re-export main types for convenience
pub use checkpoint::{compute_config_hash, validate_state, EngineSnapshot};
pub use engine::{PoolSummary, SettlementEngine};
