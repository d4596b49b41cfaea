//! Settlement engine
//!
//! Procedural core of the protocol. Each public operation:
//!
//! ```text
//! 1. Load the pool's records into a staged transaction
//! 2. Validate every precondition (no mutation yet)
//! 3. Apply the state change and stage wallet movements and events
//! 4. Re-check conservation and commit, or discard everything
//! ```
//!
//! Operations take an explicit `now` (seconds) and never read a clock.
//! The [`ProtocolRegistry`] is passed in by reference wherever fees,
//! treasury or penalties matter.
//!
//! # Example
//!
//! ```rust
//! use rosca_core_rs::{NewPool, PoolConfig, PoolStatus, SettlementEngine};
//!
//! let mut engine = SettlementEngine::new();
//! let registry = engine.initialize_registry("admin", "treasury", 100, 0).unwrap();
//!
//! let pool_id = engine
//!     .create_pool(&registry, "alice", NewPool::with_config(PoolConfig::default()), 0)
//!     .unwrap();
//! engine.join_pool(&pool_id, "bob", 10).unwrap();
//! engine.join_pool(&pool_id, "carol", 20).unwrap();
//!
//! assert!(engine.pool(&pool_id).unwrap().status().is_active());
//! ```

use crate::core::address::PoolId;
use crate::error::EngineError;
use crate::models::bid::BidState;
use crate::models::event::{Event, EventLog};
use crate::models::member::MemberRecord;
use crate::models::pool::{NewPool, Pool, PoolStatus};
use crate::models::registry::ProtocolRegistry;
use crate::models::state::{LedgerState, PoolBundle};
use crate::models::vault::Vault;
use crate::models::wallet::WalletBook;
use crate::settlement::cycle::open_cycle;
use crate::settlement::tx::PoolTx;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Read-only view of one pool for callers and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub pool_id: PoolId,
    pub status: PoolStatus,
    pub current_cycle: u8,
    pub total_cycles: u8,
    pub members: Vec<String>,
    pub contributed_this_cycle: usize,
    pub current_recipient: Option<String>,
    pub vault_balance: i64,
    pub collateral_balance: i64,
    pub frozen: bool,
}

/// The rotating-savings settlement engine
#[derive(Debug, Clone, Default)]
pub struct SettlementEngine {
    pub(crate) state: LedgerState,
    pub(crate) events: EventLog,
}

impl SettlementEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(state: LedgerState, events: EventLog) -> Self {
        Self { state, events }
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Bootstrap the protocol registry
    pub fn initialize_registry(
        &mut self,
        admin: &str,
        treasury: &str,
        fee_bps: u16,
        now: u64,
    ) -> Result<ProtocolRegistry, EngineError> {
        let registry = ProtocolRegistry::initialize(admin, treasury, fee_bps)?;
        info!(admin, treasury, fee_bps, "registry initialized");
        self.events.log(Event::RegistryInitialized {
            at: now,
            admin: admin.to_string(),
            treasury: treasury.to_string(),
            fee_bps,
        });
        Ok(registry)
    }

    pub fn update_fee(
        &mut self,
        registry: &mut ProtocolRegistry,
        caller: &str,
        fee_bps: u16,
        now: u64,
    ) -> Result<(), EngineError> {
        registry.update_fee(caller, fee_bps)?;
        self.log_registry_update(registry, now);
        Ok(())
    }

    pub fn update_treasury(
        &mut self,
        registry: &mut ProtocolRegistry,
        caller: &str,
        treasury: &str,
        now: u64,
    ) -> Result<(), EngineError> {
        registry.update_treasury(caller, treasury)?;
        self.log_registry_update(registry, now);
        Ok(())
    }

    pub fn update_penalty(
        &mut self,
        registry: &mut ProtocolRegistry,
        caller: &str,
        penalty_bps: u16,
        now: u64,
    ) -> Result<(), EngineError> {
        registry.update_penalty(caller, penalty_bps)?;
        self.log_registry_update(registry, now);
        Ok(())
    }

    fn log_registry_update(&mut self, registry: &ProtocolRegistry, now: u64) {
        info!(
            fee_bps = registry.fee_bps(),
            treasury = registry.treasury(),
            penalty_bps = registry.penalty_bps(),
            "registry updated"
        );
        self.events.log(Event::RegistryUpdated {
            at: now,
            fee_bps: registry.fee_bps(),
            treasury: registry.treasury().to_string(),
            penalty_bps: registry.penalty_bps(),
        });
    }

    // ========================================================================
    // Wallets
    // ========================================================================

    /// Credit an external balance
    pub fn fund_wallet(&mut self, owner: &str, amount: i64) -> Result<(), EngineError> {
        self.state.wallets_mut().fund(owner, amount)?;
        debug!(owner, amount, "wallet funded");
        Ok(())
    }

    pub fn wallet_balance(&self, owner: &str) -> i64 {
        self.state.wallets().balance(owner)
    }

    pub fn wallets(&self) -> &WalletBook {
        self.state.wallets()
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `op` against a staged copy of the pool and commit on success
    ///
    /// Fatal failures freeze the pool; nothing else survives an error.
    pub(crate) fn execute<F>(&mut self, pool_id: &PoolId, now: u64, op: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut PoolTx, &WalletBook) -> Result<(), EngineError>,
    {
        let mut tx = PoolTx::begin(&self.state, pool_id, now)?;
        if tx.bundle.pool.is_frozen() {
            return Err(EngineError::PoolFrozen);
        }

        let result = op(&mut tx, self.state.wallets())
            .and_then(|()| tx.commit(&mut self.state, &mut self.events));

        if let Err(err) = &result {
            if err.is_fatal() {
                self.freeze(pool_id, now, err);
            }
        }
        result
    }

    fn freeze(&mut self, pool_id: &PoolId, now: u64, cause: &EngineError) {
        if self.state.set_frozen(pool_id, true) {
            error!(pool = %pool_id, error = %cause, "pool frozen");
            self.events.log(Event::PoolFrozen {
                at: now,
                pool_id: *pool_id,
                reason: cause.to_string(),
            });
        }
    }

    // ========================================================================
    // Pool lifecycle
    // ========================================================================

    /// Create a pool in `Initializing` with the creator seated first
    pub fn create_pool(
        &mut self,
        registry: &ProtocolRegistry,
        creator: &str,
        request: NewPool,
        now: u64,
    ) -> Result<PoolId, EngineError> {
        registry.validate()?;
        request.config.validate()?;

        let pool_id = match request.id {
            Some(id) if self.state.contains_pool(&id) => {
                return Err(EngineError::PoolAlreadyExists(id))
            }
            Some(id) => id,
            None => {
                let mut id = PoolId::generate();
                while self.state.contains_pool(&id) {
                    id = PoolId::generate();
                }
                id
            }
        };

        let mut pool = Pool::new(
            pool_id,
            creator,
            request.asset.clone(),
            request.config.clone(),
            Vec::new(),
            now,
        );
        for member in &request.whitelist {
            pool.add_to_whitelist(member);
        }

        let mut members = BTreeMap::new();
        members.insert(creator.to_string(), MemberRecord::new(creator, pool_id));
        let bundle = PoolBundle {
            pool,
            members,
            bids: BidState::new(pool_id, 0),
            vault: Vault::new(pool_id, request.asset),
        };

        let mut tx = PoolTx::with_bundle(bundle, now);
        tx.emit(Event::PoolCreated {
            at: now,
            pool_id,
            creator: creator.to_string(),
            max_participants: request.config.max_participants,
            contribution_amount: request.config.contribution_amount,
            payout_mode: request.config.payout_mode,
        });
        tx.emit(Event::MemberJoined {
            at: now,
            pool_id,
            member: creator.to_string(),
            seat: 0,
        });
        tx.commit(&mut self.state, &mut self.events)?;

        info!(
            pool = %pool_id,
            creator,
            seats = request.config.max_participants,
            contribution = request.config.contribution_amount,
            "pool created"
        );
        Ok(pool_id)
    }

    /// Take a seat; the last seat activates the pool and opens cycle 0
    pub fn join_pool(&mut self, pool_id: &PoolId, member: &str, now: u64) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            let pool = &tx.bundle.pool;
            if pool.is_member(member) {
                return Err(EngineError::AlreadyParticipant(member.to_string()));
            }
            if pool.is_full() {
                return Err(EngineError::PoolFull);
            }
            if pool.status() != PoolStatus::Initializing {
                return Err(EngineError::PoolNotAcceptingParticipants);
            }
            if !pool.is_whitelisted(member) {
                return Err(EngineError::NotWhitelisted(member.to_string()));
            }

            let pool_id = tx.pool_id();
            tx.bundle.pool.add_member(member);
            tx.bundle
                .members
                .insert(member.to_string(), MemberRecord::new(member, pool_id));
            let seat = tx.bundle.pool.members().len() - 1;
            info!(pool = %pool_id, member, seat, "member joined");
            tx.emit(Event::MemberJoined {
                at: now,
                pool_id,
                member: member.to_string(),
                seat,
            });

            if tx.bundle.pool.is_full() {
                tx.bundle.pool.activate(now);
                open_cycle(tx)?;
                let payout_order = tx.bundle.pool.payout_order().to_vec();
                info!(pool = %pool_id, "pool activated");
                tx.emit(Event::PoolActivated {
                    at: now,
                    pool_id,
                    payout_order,
                });
            }
            Ok(())
        })
    }

    /// Allow `member` to join a private pool
    pub fn add_to_whitelist(
        &mut self,
        pool_id: &PoolId,
        caller: &str,
        member: &str,
        now: u64,
    ) -> Result<(), EngineError> {
        self.execute(pool_id, now, |tx, _| {
            if !tx.bundle.pool.is_creator(caller) {
                return Err(EngineError::NotPoolCreator);
            }
            if tx.bundle.pool.status() != PoolStatus::Initializing {
                return Err(EngineError::PoolNotAcceptingParticipants);
            }
            if tx.bundle.pool.add_to_whitelist(member) {
                let pool_id = tx.pool_id();
                debug!(pool = %pool_id, member, "whitelisted");
                tx.emit(Event::WhitelistUpdated {
                    at: now,
                    pool_id,
                    member: member.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Release a completed, empty pool's records
    pub fn close_pool(&mut self, pool_id: &PoolId, caller: &str, now: u64) -> Result<(), EngineError> {
        let pool = self
            .state
            .pool(pool_id)
            .ok_or(EngineError::PoolNotFound(*pool_id))?;
        if !pool.is_creator(caller) {
            return Err(EngineError::NotPoolCreator);
        }
        if pool.is_frozen() {
            return Err(EngineError::PoolFrozen);
        }
        if pool.status() != PoolStatus::Completed {
            return Err(EngineError::PoolStillActive);
        }
        let balance = self.state.vault(pool_id).map_or(0, |v| v.balance());
        if balance != 0 {
            return Err(EngineError::VaultNotEmpty { balance });
        }

        self.state.remove(pool_id);
        info!(pool = %pool_id, "pool closed");
        self.events.log(Event::PoolClosed {
            at: now,
            pool_id: *pool_id,
        });
        Ok(())
    }

    /// Lift a freeze after manual intervention
    pub fn unfreeze_pool(
        &mut self,
        registry: &ProtocolRegistry,
        caller: &str,
        pool_id: &PoolId,
        now: u64,
    ) -> Result<(), EngineError> {
        registry.require_admin(caller)?;
        let pool = self
            .state
            .pool(pool_id)
            .ok_or(EngineError::PoolNotFound(*pool_id))?;
        if !pool.is_frozen() {
            return Err(EngineError::PoolNotFrozen);
        }
        let bundle = self.state.load(pool_id)?;
        bundle.check_conservation()?;

        self.state.set_frozen(pool_id, false);
        info!(pool = %pool_id, "pool unfrozen");
        self.events.log(Event::PoolUnfrozen {
            at: now,
            pool_id: *pool_id,
        });
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut LedgerState {
        &mut self.state
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn pool(&self, pool_id: &PoolId) -> Result<&Pool, EngineError> {
        self.state
            .pool(pool_id)
            .ok_or(EngineError::PoolNotFound(*pool_id))
    }

    pub fn member(&self, pool_id: &PoolId, owner: &str) -> Result<&MemberRecord, EngineError> {
        self.pool(pool_id)?;
        self.state
            .member(pool_id, owner)
            .ok_or_else(|| EngineError::NotParticipant(owner.to_string()))
    }

    pub fn bid_state(&self, pool_id: &PoolId) -> Result<&BidState, EngineError> {
        self.state
            .bid_state(pool_id)
            .ok_or(EngineError::PoolNotFound(*pool_id))
    }

    pub fn vault(&self, pool_id: &PoolId) -> Result<&Vault, EngineError> {
        self.state
            .vault(pool_id)
            .ok_or(EngineError::PoolNotFound(*pool_id))
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.state.pool_ids()
    }

    pub fn summary(&self, pool_id: &PoolId) -> Result<PoolSummary, EngineError> {
        let bundle = self.state.load(pool_id)?;
        let contributed_this_cycle = bundle
            .members_in_order()
            .filter(|m| m.has_contributed_this_cycle())
            .count();
        let pool = &bundle.pool;
        Ok(PoolSummary {
            pool_id: *pool_id,
            status: pool.status(),
            current_cycle: pool.current_cycle(),
            total_cycles: pool.total_cycles(),
            members: pool.members().to_vec(),
            contributed_this_cycle,
            current_recipient: pool.current_winner().map(str::to_string),
            vault_balance: bundle.vault.balance(),
            collateral_balance: bundle.vault.collateral_balance(),
            frozen: pool.is_frozen(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pool::{CyclePhase, PoolConfig};

    fn setup() -> (SettlementEngine, ProtocolRegistry, PoolId) {
        let mut engine = SettlementEngine::new();
        let registry = engine.initialize_registry("admin", "treasury", 100, 0).unwrap();
        for who in ["alice", "bob", "carol"] {
            engine.fund_wallet(who, 10_000).unwrap();
        }
        let pool_id = engine
            .create_pool(&registry, "alice", NewPool::with_config(PoolConfig::default()), 0)
            .unwrap();
        engine.join_pool(&pool_id, "bob", 1).unwrap();
        engine.join_pool(&pool_id, "carol", 2).unwrap();
        (engine, registry, pool_id)
    }

    #[test]
    fn test_activation_opens_bidding_phase() {
        let (mut engine, _, pool_id) = setup();
        let pool = engine.pool(&pool_id).unwrap();
        assert_eq!(pool.phase(), Some(CyclePhase::Bidding));
        assert_eq!(pool.current_winner(), Some("alice"));
        assert!(engine.member(&pool_id, "alice").unwrap().eligible_for_payout());

        // Nothing to bid on in join order; the first contribution moves on
        assert_eq!(
            engine.close_bidding(&pool_id, "alice", 3),
            Err(EngineError::InvalidPhase)
        );
        engine.contribute(&pool_id, "bob", 100, 4).unwrap();
        assert_eq!(
            engine.pool(&pool_id).unwrap().phase(),
            Some(CyclePhase::Contributing)
        );
        assert!(engine.event_log().events_of_type("BiddingClosed").is_empty());
    }

    #[test]
    fn test_settlement_shortfall_freezes_pool() {
        let (mut engine, registry, pool_id) = setup();
        for who in ["alice", "bob", "carol"] {
            engine.contribute(&pool_id, who, 100, 10).unwrap();
        }

        // Drain the pot behind the engine's back
        let mut bundle = engine.state().load(&pool_id).unwrap();
        bundle.vault.disburse(250).unwrap();
        engine.state_mut().store(bundle);

        let err = engine
            .force_advance_cycle(&registry, &pool_id, "alice", 0, 20)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientPoolFunds(_)));
        assert!(engine.pool(&pool_id).unwrap().is_frozen());
        assert_eq!(engine.event_log().events_of_type("PoolFrozen").len(), 1);

        assert_eq!(
            engine.contribute(&pool_id, "alice", 100, 30),
            Err(EngineError::PoolFrozen)
        );
        assert_eq!(
            engine.unfreeze_pool(&registry, "mallory", &pool_id, 40),
            Err(EngineError::NotRegistryAdmin)
        );
    }

    #[test]
    fn test_unfreeze_requires_frozen_pool() {
        let (mut engine, registry, pool_id) = setup();
        assert_eq!(
            engine.unfreeze_pool(&registry, "admin", &pool_id, 5),
            Err(EngineError::PoolNotFrozen)
        );
    }

    #[test]
    fn test_unfreeze_after_repair() {
        let (mut engine, registry, pool_id) = setup();
        engine.state_mut().set_frozen(&pool_id, true);
        engine.unfreeze_pool(&registry, "admin", &pool_id, 5).unwrap();
        assert!(!engine.pool(&pool_id).unwrap().is_frozen());
        engine.contribute(&pool_id, "bob", 100, 6).unwrap();
    }

    #[test]
    fn test_registry_updates_are_logged() {
        let mut engine = SettlementEngine::new();
        let mut registry = engine.initialize_registry("admin", "treasury", 100, 0).unwrap();
        engine.update_fee(&mut registry, "admin", 50, 1).unwrap();
        assert!(engine.update_fee(&mut registry, "bob", 60, 2).is_err());
        assert_eq!(engine.event_log().events_of_type("RegistryUpdated").len(), 1);
        assert_eq!(registry.fee_bps(), 50);
    }
}
