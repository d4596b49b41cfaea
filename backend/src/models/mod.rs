//! Domain models for the rotating-savings engine

pub mod bid;
pub mod event;
pub mod member;
pub mod pool;
pub mod registry;
pub mod state;
pub mod vault;
pub mod wallet;

// Re-exports
pub use bid::{BidEntry, BidState};
pub use event::{Event, EventLog};
pub use member::{MemberRecord, MemberStatus};
pub use pool::{Asset, CyclePhase, NewPool, PayoutMode, Pool, PoolConfig, PoolStatus};
pub use registry::ProtocolRegistry;
pub use state::{LedgerState, PoolBundle};
pub use vault::{Vault, VaultError};
pub use wallet::{Wallet, WalletBook, WalletError};
