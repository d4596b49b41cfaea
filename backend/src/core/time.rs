//! Cycle timing for a pool
//!
//! Cycles are measured in wall-clock seconds supplied by the caller. The
//! engine never reads a clock itself, so every operation is deterministic
//! given its `now` argument.

use serde::{Deserialize, Serialize};

/// Timing window of the cycle currently in progress
///
/// # Example
/// ```
/// use rosca_core_rs::CycleWindow;
///
/// let mut window = CycleWindow::open(1_000, 300, 60);
/// assert_eq!(window.ends_at(), 1_300);
/// assert!(!window.can_settle(1_299));
/// assert!(window.can_settle(1_300));
///
/// // Once the pot is full, settlement opens after the payout delay
/// window.mark_ready(1_100);
/// assert_eq!(window.settle_available_at(), 1_160);
/// assert!(window.can_settle(1_160));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWindow {
    /// Timestamp the cycle opened at
    started_at: u64,
    /// Length of the contribution window in seconds
    duration: u64,
    /// Delay between the pot filling and payout becoming claimable
    payout_delay: u64,
    /// Timestamp every member had contributed, if reached
    ready_at: Option<u64>,
}

impl CycleWindow {
    /// Open a new cycle window at `started_at`
    ///
    /// # Panics
    /// Panics if `duration` is zero. Pool configs are validated before any
    /// window is opened.
    pub fn open(started_at: u64, duration: u64, payout_delay: u64) -> Self {
        assert!(duration > 0, "cycle duration must be positive");
        Self {
            started_at,
            duration,
            payout_delay,
            ready_at: None,
        }
    }

    /// Start the next cycle at `now`, keeping duration and delay
    pub fn reopen(&mut self, now: u64) {
        self.started_at = now;
        self.ready_at = None;
    }

    /// Record that the pot filled at `now` (first call wins)
    pub fn mark_ready(&mut self, now: u64) {
        if self.ready_at.is_none() {
            self.ready_at = Some(now);
        }
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn ready_at(&self) -> Option<u64> {
        self.ready_at
    }

    /// Timestamp the contribution window closes
    pub fn ends_at(&self) -> u64 {
        self.started_at.saturating_add(self.duration)
    }

    /// Timestamp the winner may claim a full pot
    pub fn payout_available_at(&self) -> Option<u64> {
        self.ready_at
            .map(|ready| ready.saturating_add(self.payout_delay))
    }

    /// Earliest timestamp anyone may settle this cycle
    pub fn settle_available_at(&self) -> u64 {
        match self.payout_available_at() {
            Some(at) => at.min(self.ends_at()),
            None => self.ends_at(),
        }
    }

    /// Whether a permissionless settlement is allowed at `now`
    pub fn can_settle(&self, now: u64) -> bool {
        now >= self.settle_available_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "cycle duration must be positive")]
    fn test_zero_duration_panics() {
        CycleWindow::open(0, 0, 0);
    }

    #[test]
    fn test_reopen_clears_ready() {
        let mut window = CycleWindow::open(0, 100, 10);
        window.mark_ready(50);
        window.reopen(100);
        assert_eq!(window.ready_at(), None);
        assert_eq!(window.ends_at(), 200);
    }

    #[test]
    fn test_first_ready_mark_wins() {
        let mut window = CycleWindow::open(0, 100, 10);
        window.mark_ready(20);
        window.mark_ready(40);
        assert_eq!(window.payout_available_at(), Some(30));
    }

    #[test]
    fn test_late_ready_does_not_extend_window() {
        let mut window = CycleWindow::open(0, 100, 50);
        window.mark_ready(90);
        assert_eq!(window.settle_available_at(), 100);
    }
}
