//! Per-cycle bidding ledger
//!
//! Bids are kept in submission order. Resolution picks the highest amount;
//! among equal amounts the earliest submission wins.

use crate::core::address::PoolId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidEntry {
    pub bidder: String,
    /// Discount the bidder accepts on the pot
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidState {
    pool: PoolId,
    cycle: u8,
    bids: Vec<BidEntry>,
    winner: Option<String>,
}

impl BidState {
    pub fn new(pool: PoolId, cycle: u8) -> Self {
        Self {
            pool,
            cycle,
            bids: Vec::new(),
            winner: None,
        }
    }

    pub fn pool(&self) -> &PoolId {
        &self.pool
    }

    pub fn cycle(&self) -> u8 {
        self.cycle
    }

    pub fn bids(&self) -> &[BidEntry] {
        &self.bids
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn has_bid(&self, bidder: &str) -> bool {
        self.bids.iter().any(|b| b.bidder == bidder)
    }

    pub fn bid_of(&self, bidder: &str) -> Option<i64> {
        self.bids
            .iter()
            .find(|b| b.bidder == bidder)
            .map(|b| b.amount)
    }

    /// Record a bid; returns false if the bidder already bid this cycle
    pub(crate) fn place(&mut self, bidder: &str, amount: i64) -> bool {
        if self.has_bid(bidder) {
            return false;
        }
        self.bids.push(BidEntry {
            bidder: bidder.to_string(),
            amount,
        });
        true
    }

    /// Best bid among bidders accepted by `eligible`
    ///
    /// Only a strictly greater amount replaces the current best, so ties
    /// keep the earliest submission.
    pub fn best<F>(&self, eligible: F) -> Option<&BidEntry>
    where
        F: Fn(&str) -> bool,
    {
        let mut best: Option<&BidEntry> = None;
        for entry in self.bids.iter().filter(|b| eligible(&b.bidder)) {
            match best {
                Some(current) if entry.amount <= current.amount => {}
                _ => best = Some(entry),
            }
        }
        best
    }

    /// Fix the winner for this cycle. A winner, once set, never changes.
    pub(crate) fn set_winner(&mut self, winner: &str) -> bool {
        if self.winner.is_some() {
            return false;
        }
        self.winner = Some(winner.to_string());
        true
    }

    /// Clear for the next cycle
    pub(crate) fn reset(&mut self, cycle: u8) {
        self.cycle = cycle;
        self.bids.clear();
        self.winner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state() -> BidState {
        BidState::new("POOL01".parse().unwrap(), 0)
    }

    #[test]
    fn test_one_bid_per_bidder() {
        let mut bids = state();
        assert!(bids.place("bob", 40));
        assert!(!bids.place("bob", 90));
        assert_eq!(bids.bid_of("bob"), Some(40));
        assert_eq!(bids.bids().len(), 1);
    }

    #[test]
    fn test_highest_wins_regardless_of_order() {
        let mut bids = state();
        bids.place("carol", 60);
        bids.place("bob", 40);
        assert_eq!(bids.best(|_| true).map(|b| b.bidder.as_str()), Some("carol"));

        let mut reversed = state();
        reversed.place("bob", 40);
        reversed.place("carol", 60);
        assert_eq!(reversed.best(|_| true).map(|b| b.bidder.as_str()), Some("carol"));
    }

    #[test]
    fn test_tie_goes_to_earliest() {
        let mut bids = state();
        bids.place("bob", 50);
        bids.place("carol", 50);
        assert_eq!(bids.best(|_| true).map(|b| b.bidder.as_str()), Some("bob"));
    }

    #[test]
    fn test_ineligible_bidders_are_skipped() {
        let mut bids = state();
        bids.place("bob", 90);
        bids.place("carol", 10);
        let best = bids.best(|who| who != "bob");
        assert_eq!(best.map(|b| b.bidder.as_str()), Some("carol"));
    }

    #[test]
    fn test_winner_is_immutable() {
        let mut bids = state();
        assert!(bids.set_winner("bob"));
        assert!(!bids.set_winner("carol"));
        assert_eq!(bids.winner(), Some("bob"));

        bids.reset(1);
        assert_eq!(bids.winner(), None);
        assert_eq!(bids.cycle(), 1);
    }

    proptest! {
        #[test]
        fn prop_winner_bid_dominates(amounts in prop::collection::vec(1i64..500, 1..20)) {
            let mut bids = state();
            for (i, amount) in amounts.iter().enumerate() {
                bids.place(&format!("m{}", i), *amount);
            }
            let best = bids.best(|_| true).cloned().unwrap();
            let first_at_max = amounts.iter().position(|a| *a == best.amount).unwrap();
            prop_assert!(amounts.iter().all(|a| *a <= best.amount));
            prop_assert_eq!(best.bidder, format!("m{}", first_at_max));
        }
    }
}
