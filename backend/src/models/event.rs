//! Event log for replay and auditing.
//!
//! Every committed engine operation appends one or more [`Event`]s. Events
//! from an operation that failed are discarded with the rest of its staged
//! state, so the log only ever describes what actually happened.
//!
//! # Event Types
//!
//! - **Registry**: protocol settings created or changed
//! - **Membership**: pool created, member joined, whitelist, activation
//! - **Cycle**: contributions, bids, bidding closed, misses
//! - **Settlement**: payouts, dividends, refunds, early payouts
//! - **Collateral**: deposits, draws, withdrawals
//! - **Lifecycle**: cycle advanced, completed, frozen, closed
//!
//! # Example
//!
//! ```rust
//! use rosca_core_rs::models::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::Contribution {
//!     at: 1_000,
//!     pool_id: "POOL01".parse().unwrap(),
//!     member: "alice".to_string(),
//!     amount: 100,
//!     cycle: 0,
//! });
//!
//! assert_eq!(log.events_of_type("Contribution").len(), 1);
//! ```

use crate::core::address::PoolId;
use crate::models::pool::PayoutMode;
use serde::{Deserialize, Serialize};

/// Engine event capturing a committed state change.
///
/// `at` is the caller-supplied timestamp of the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    RegistryInitialized {
        at: u64,
        admin: String,
        treasury: String,
        fee_bps: u16,
    },

    RegistryUpdated {
        at: u64,
        fee_bps: u16,
        treasury: String,
        penalty_bps: u16,
    },

    PoolCreated {
        at: u64,
        pool_id: PoolId,
        creator: String,
        max_participants: u8,
        contribution_amount: i64,
        payout_mode: PayoutMode,
    },

    MemberJoined {
        at: u64,
        pool_id: PoolId,
        member: String,
        /// Zero-based seat, which is also the join order
        seat: usize,
    },

    WhitelistUpdated {
        at: u64,
        pool_id: PoolId,
        member: String,
    },

    /// Last seat filled; cycle 0 opened
    PoolActivated {
        at: u64,
        pool_id: PoolId,
        payout_order: Vec<String>,
    },

    Contribution {
        at: u64,
        pool_id: PoolId,
        member: String,
        amount: i64,
        cycle: u8,
    },

    BidPlaced {
        at: u64,
        pool_id: PoolId,
        bidder: String,
        amount: i64,
        cycle: u8,
    },

    BiddingClosed {
        at: u64,
        pool_id: PoolId,
        cycle: u8,
        winner: Option<String>,
        /// None when the winner came from the no-bid fallback
        bid_amount: Option<i64>,
    },

    CollateralDeposited {
        at: u64,
        pool_id: PoolId,
        member: String,
        amount: i64,
        new_total: i64,
    },

    /// Collateral covered a missed contribution
    CollateralDrawn {
        at: u64,
        pool_id: PoolId,
        member: String,
        cycle: u8,
        amount: i64,
        penalty: i64,
    },

    /// Missed contribution with no collateral to cover it
    ContributionMissed {
        at: u64,
        pool_id: PoolId,
        member: String,
        cycle: u8,
    },

    /// Stake left over after a default, sent to the treasury
    CollateralForfeited {
        at: u64,
        pool_id: PoolId,
        member: String,
        cycle: u8,
        amount: i64,
    },

    CollateralWithdrawn {
        at: u64,
        pool_id: PoolId,
        member: String,
        amount: i64,
    },

    PayoutSettled {
        at: u64,
        pool_id: PoolId,
        cycle: u8,
        recipient: String,
        gross: i64,
        fee: i64,
        net: i64,
    },

    /// Share of the winning bid's discount
    DividendPaid {
        at: u64,
        pool_id: PoolId,
        cycle: u8,
        member: String,
        amount: i64,
    },

    /// No eligible recipient; contributors got their money back
    CycleRefunded {
        at: u64,
        pool_id: PoolId,
        cycle: u8,
        total: i64,
    },

    EarlyPayout {
        at: u64,
        pool_id: PoolId,
        cycle: u8,
        member: String,
        gross: i64,
        protocol_fee: i64,
        early_fee: i64,
        net: i64,
    },

    CycleAdvanced {
        at: u64,
        pool_id: PoolId,
        /// Cycle now in progress
        cycle: u8,
        forced: bool,
    },

    PoolCompleted {
        at: u64,
        pool_id: PoolId,
    },

    PoolFrozen {
        at: u64,
        pool_id: PoolId,
        reason: String,
    },

    PoolUnfrozen {
        at: u64,
        pool_id: PoolId,
    },

    PoolClosed {
        at: u64,
        pool_id: PoolId,
    },
}

impl Event {
    /// Timestamp the event was committed at
    pub fn at(&self) -> u64 {
        match self {
            Event::RegistryInitialized { at, .. }
            | Event::RegistryUpdated { at, .. }
            | Event::PoolCreated { at, .. }
            | Event::MemberJoined { at, .. }
            | Event::WhitelistUpdated { at, .. }
            | Event::PoolActivated { at, .. }
            | Event::Contribution { at, .. }
            | Event::BidPlaced { at, .. }
            | Event::BiddingClosed { at, .. }
            | Event::CollateralDeposited { at, .. }
            | Event::CollateralDrawn { at, .. }
            | Event::ContributionMissed { at, .. }
            | Event::CollateralForfeited { at, .. }
            | Event::CollateralWithdrawn { at, .. }
            | Event::PayoutSettled { at, .. }
            | Event::DividendPaid { at, .. }
            | Event::CycleRefunded { at, .. }
            | Event::EarlyPayout { at, .. }
            | Event::CycleAdvanced { at, .. }
            | Event::PoolCompleted { at, .. }
            | Event::PoolFrozen { at, .. }
            | Event::PoolUnfrozen { at, .. }
            | Event::PoolClosed { at, .. } => *at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RegistryInitialized { .. } => "RegistryInitialized",
            Event::RegistryUpdated { .. } => "RegistryUpdated",
            Event::PoolCreated { .. } => "PoolCreated",
            Event::MemberJoined { .. } => "MemberJoined",
            Event::WhitelistUpdated { .. } => "WhitelistUpdated",
            Event::PoolActivated { .. } => "PoolActivated",
            Event::Contribution { .. } => "Contribution",
            Event::BidPlaced { .. } => "BidPlaced",
            Event::BiddingClosed { .. } => "BiddingClosed",
            Event::CollateralDeposited { .. } => "CollateralDeposited",
            Event::CollateralDrawn { .. } => "CollateralDrawn",
            Event::ContributionMissed { .. } => "ContributionMissed",
            Event::CollateralForfeited { .. } => "CollateralForfeited",
            Event::CollateralWithdrawn { .. } => "CollateralWithdrawn",
            Event::PayoutSettled { .. } => "PayoutSettled",
            Event::DividendPaid { .. } => "DividendPaid",
            Event::CycleRefunded { .. } => "CycleRefunded",
            Event::EarlyPayout { .. } => "EarlyPayout",
            Event::CycleAdvanced { .. } => "CycleAdvanced",
            Event::PoolCompleted { .. } => "PoolCompleted",
            Event::PoolFrozen { .. } => "PoolFrozen",
            Event::PoolUnfrozen { .. } => "PoolUnfrozen",
            Event::PoolClosed { .. } => "PoolClosed",
        }
    }

    /// Pool the event belongs to (registry events have none)
    pub fn pool_id(&self) -> Option<&PoolId> {
        match self {
            Event::RegistryInitialized { .. } | Event::RegistryUpdated { .. } => None,
            Event::PoolCreated { pool_id, .. }
            | Event::MemberJoined { pool_id, .. }
            | Event::WhitelistUpdated { pool_id, .. }
            | Event::PoolActivated { pool_id, .. }
            | Event::Contribution { pool_id, .. }
            | Event::BidPlaced { pool_id, .. }
            | Event::BiddingClosed { pool_id, .. }
            | Event::CollateralDeposited { pool_id, .. }
            | Event::CollateralDrawn { pool_id, .. }
            | Event::ContributionMissed { pool_id, .. }
            | Event::CollateralForfeited { pool_id, .. }
            | Event::CollateralWithdrawn { pool_id, .. }
            | Event::PayoutSettled { pool_id, .. }
            | Event::DividendPaid { pool_id, .. }
            | Event::CycleRefunded { pool_id, .. }
            | Event::EarlyPayout { pool_id, .. }
            | Event::CycleAdvanced { pool_id, .. }
            | Event::PoolCompleted { pool_id, .. }
            | Event::PoolFrozen { pool_id, .. }
            | Event::PoolUnfrozen { pool_id, .. }
            | Event::PoolClosed { pool_id, .. } => Some(pool_id),
        }
    }

    /// Member the event is about, if any
    pub fn member(&self) -> Option<&str> {
        match self {
            Event::PoolCreated { creator, .. } => Some(creator),
            Event::MemberJoined { member, .. }
            | Event::WhitelistUpdated { member, .. }
            | Event::Contribution { member, .. }
            | Event::CollateralDeposited { member, .. }
            | Event::CollateralDrawn { member, .. }
            | Event::ContributionMissed { member, .. }
            | Event::CollateralForfeited { member, .. }
            | Event::CollateralWithdrawn { member, .. }
            | Event::DividendPaid { member, .. }
            | Event::EarlyPayout { member, .. } => Some(member),
            Event::BidPlaced { bidder, .. } => Some(bidder),
            Event::PayoutSettled { recipient, .. } => Some(recipient),
            _ => None,
        }
    }
}

/// Append-only event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub(crate) fn extend(&mut self, events: Vec<Event>) {
        self.events.extend(events);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_pool(&self, pool_id: &PoolId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.pool_id() == Some(pool_id))
            .collect()
    }

    pub fn events_for_member(&self, member: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.member() == Some(member))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
