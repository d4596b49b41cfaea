//! Ledger state
//!
//! Arena of every record the engine owns, keyed by content-derived
//! [`Address`]es. Callers never hold references between records; they
//! recompute the address from stable seeds (pool id, owner) and look it up.
//!
//! # Critical Invariants
//!
//! 1. Each pool has exactly one vault and one bid state
//! 2. Each pool member has exactly one member record
//! 3. Every record is stored under the address its seeds derive to

use crate::core::address::{Address, PoolId};
use crate::error::EngineError;
use crate::models::bid::BidState;
use crate::models::member::MemberRecord;
use crate::models::pool::Pool;
use crate::models::vault::Vault;
use crate::models::wallet::WalletBook;
use std::collections::BTreeMap;

/// Working copy of one pool's full state
///
/// An operation loads a bundle, mutates it, and stores it back only if
/// every check passes.
#[derive(Debug, Clone)]
pub struct PoolBundle {
    pub pool: Pool,
    /// Keyed by owner; iterate in join order via `pool.members()`
    pub members: BTreeMap<String, MemberRecord>,
    pub bids: BidState,
    pub vault: Vault,
}

impl PoolBundle {
    pub fn member(&self, owner: &str) -> Option<&MemberRecord> {
        self.members.get(owner)
    }

    pub fn member_mut(&mut self, owner: &str) -> Result<&mut MemberRecord, EngineError> {
        self.members
            .get_mut(owner)
            .ok_or_else(|| EngineError::NotParticipant(owner.to_string()))
    }

    /// Members in join order
    pub fn members_in_order(&self) -> impl Iterator<Item = &MemberRecord> {
        self.pool
            .members()
            .iter()
            .filter_map(move |owner| self.members.get(owner))
    }

    /// Conservation law for this pool
    ///
    /// ```text
    /// vault.contributions == pool.total_contributions
    /// vault.collateral    == Σ collateral_staked
    /// vault.balance       == Σ total_contributed + Σ collateral_staked
    ///                        − disbursed − fees_routed
    /// ```
    pub fn check_conservation(&self) -> Result<(), EngineError> {
        let violation = |detail: String| EngineError::ConservationViolated {
            pool_id: *self.pool.id(),
            detail,
        };

        if self.vault.contribution_balance() != self.pool.total_contributions() {
            return Err(violation(format!(
                "pot {} != recorded contributions {}",
                self.vault.contribution_balance(),
                self.pool.total_contributions()
            )));
        }

        let staked: i64 = self.members.values().map(|m| m.collateral_staked()).sum();
        if self.vault.collateral_balance() != staked {
            return Err(violation(format!(
                "collateral {} != staked {}",
                self.vault.collateral_balance(),
                staked
            )));
        }

        let contributed: i64 = self.members.values().map(|m| m.total_contributed()).sum();
        let expected = contributed + staked
            - self.vault.total_disbursed()
            - self.vault.total_fees_routed();
        if self.vault.balance() != expected {
            return Err(violation(format!(
                "vault {} != contributed {} + staked {} - disbursed {} - fees {}",
                self.vault.balance(),
                contributed,
                staked,
                self.vault.total_disbursed(),
                self.vault.total_fees_routed()
            )));
        }
        Ok(())
    }
}

/// All engine-owned records plus external wallets
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    pools: BTreeMap<Address, Pool>,
    members: BTreeMap<Address, MemberRecord>,
    bids: BTreeMap<Address, BidState>,
    vaults: BTreeMap<Address, Vault>,
    wallets: WalletBook,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, pool_id: &PoolId) -> Option<&Pool> {
        self.pools.get(&Address::pool(pool_id))
    }

    pub fn member(&self, pool_id: &PoolId, owner: &str) -> Option<&MemberRecord> {
        self.members.get(&Address::member(pool_id, owner))
    }

    pub fn bid_state(&self, pool_id: &PoolId) -> Option<&BidState> {
        self.bids.get(&Address::bid_state(pool_id))
    }

    pub fn vault(&self, pool_id: &PoolId) -> Option<&Vault> {
        self.vaults.get(&Address::vault(pool_id))
    }

    pub fn wallets(&self) -> &WalletBook {
        &self.wallets
    }

    pub(crate) fn wallets_mut(&mut self) -> &mut WalletBook {
        &mut self.wallets
    }

    pub fn contains_pool(&self, pool_id: &PoolId) -> bool {
        self.pools.contains_key(&Address::pool(pool_id))
    }

    pub fn num_pools(&self) -> usize {
        self.pools.len()
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.pools.values().map(|p| *p.id()).collect()
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn member_records(&self) -> impl Iterator<Item = &MemberRecord> {
        self.members.values()
    }

    pub fn bid_states(&self) -> impl Iterator<Item = &BidState> {
        self.bids.values()
    }

    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }

    /// Sum of every vault's holdings
    pub fn total_custody(&self) -> i64 {
        self.vaults.values().map(|v| v.balance()).sum()
    }

    /// Clone one pool's records into a working bundle
    pub fn load(&self, pool_id: &PoolId) -> Result<PoolBundle, EngineError> {
        let pool = self
            .pool(pool_id)
            .cloned()
            .ok_or(EngineError::PoolNotFound(*pool_id))?;
        let missing = |what: &str| {
            EngineError::InvalidSnapshot(format!("pool {} has no {}", pool_id, what))
        };

        let mut members = BTreeMap::new();
        for owner in pool.members() {
            let record = self
                .member(pool_id, owner)
                .cloned()
                .ok_or_else(|| missing(&format!("record for {}", owner)))?;
            members.insert(owner.clone(), record);
        }
        let bids = self
            .bid_state(pool_id)
            .cloned()
            .ok_or_else(|| missing("bid state"))?;
        let vault = self.vault(pool_id).cloned().ok_or_else(|| missing("vault"))?;

        Ok(PoolBundle {
            pool,
            members,
            bids,
            vault,
        })
    }

    /// Write a bundle back, replacing whatever was stored for the pool
    pub(crate) fn store(&mut self, bundle: PoolBundle) {
        let pool_id = *bundle.pool.id();
        for (owner, record) in bundle.members {
            self.members.insert(Address::member(&pool_id, &owner), record);
        }
        self.bids.insert(Address::bid_state(&pool_id), bundle.bids);
        self.vaults.insert(Address::vault(&pool_id), bundle.vault);
        self.pools.insert(Address::pool(&pool_id), bundle.pool);
    }

    /// Flag a pool outside of any transaction; returns false if unknown
    pub(crate) fn set_frozen(&mut self, pool_id: &PoolId, frozen: bool) -> bool {
        match self.pools.get_mut(&Address::pool(pool_id)) {
            Some(pool) => {
                pool.set_frozen(frozen);
                true
            }
            None => false,
        }
    }

    /// Release every record belonging to a pool
    pub(crate) fn remove(&mut self, pool_id: &PoolId) {
        if let Some(pool) = self.pools.remove(&Address::pool(pool_id)) {
            for owner in pool.members() {
                self.members.remove(&Address::member(pool_id, owner));
            }
        }
        self.bids.remove(&Address::bid_state(pool_id));
        self.vaults.remove(&Address::vault(pool_id));
    }

    /// Rebuild from raw records, checking each sits under its derived address
    pub(crate) fn from_records(
        pools: Vec<Pool>,
        members: Vec<MemberRecord>,
        bids: Vec<BidState>,
        vaults: Vec<Vault>,
        wallets: WalletBook,
    ) -> Result<Self, EngineError> {
        let mut state = Self {
            wallets,
            ..Self::default()
        };
        for pool in pools {
            if state.pools.insert(Address::pool(pool.id()), pool.clone()).is_some() {
                return Err(EngineError::InvalidSnapshot(format!(
                    "duplicate pool {}",
                    pool.id()
                )));
            }
        }
        for record in members {
            let address = Address::member(record.pool(), record.owner());
            let known = state
                .pool(record.pool())
                .map(|p| p.is_member(record.owner()))
                .unwrap_or(false);
            if !known {
                return Err(EngineError::InvalidSnapshot(format!(
                    "member record {} in {} has no seat",
                    record.owner(),
                    record.pool()
                )));
            }
            if state.members.insert(address, record).is_some() {
                return Err(EngineError::InvalidSnapshot(format!(
                    "duplicate member record at {}",
                    address
                )));
            }
        }
        for bid_state in bids {
            if !state.contains_pool(bid_state.pool()) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "bid state for unknown pool {}",
                    bid_state.pool()
                )));
            }
            let pool_id = *bid_state.pool();
            if state.bids.insert(Address::bid_state(&pool_id), bid_state).is_some() {
                return Err(EngineError::InvalidSnapshot(format!(
                    "duplicate bid state for {}",
                    pool_id
                )));
            }
        }
        for vault in vaults {
            if !state.contains_pool(vault.pool_id()) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "vault for unknown pool {}",
                    vault.pool_id()
                )));
            }
            let pool_id = *vault.pool_id();
            if state.vaults.insert(Address::vault(&pool_id), vault).is_some() {
                return Err(EngineError::InvalidSnapshot(format!(
                    "duplicate vault for {}",
                    pool_id
                )));
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pool::{Asset, PoolConfig};

    fn bundle(id: &str) -> PoolBundle {
        let pool_id: PoolId = id.parse().unwrap();
        let pool = Pool::new(pool_id, "alice", Asset::Native, PoolConfig::default(), vec![], 0);
        let mut members = BTreeMap::new();
        members.insert("alice".to_string(), MemberRecord::new("alice", pool_id));
        PoolBundle {
            pool,
            members,
            bids: BidState::new(pool_id, 0),
            vault: Vault::new(pool_id, Asset::Native),
        }
    }

    #[test]
    fn test_store_and_load() {
        let mut state = LedgerState::new();
        state.store(bundle("POOL01"));

        let pool_id: PoolId = "POOL01".parse().unwrap();
        assert!(state.contains_pool(&pool_id));
        assert!(state.member(&pool_id, "alice").is_some());
        assert!(state.member(&pool_id, "bob").is_none());

        let loaded = state.load(&pool_id).unwrap();
        assert_eq!(loaded.pool.creator(), "alice");
        assert!(loaded.check_conservation().is_ok());
    }

    #[test]
    fn test_load_unknown_pool() {
        let state = LedgerState::new();
        let pool_id: PoolId = "NOPOOL".parse().unwrap();
        assert_eq!(state.load(&pool_id).unwrap_err(), EngineError::PoolNotFound(pool_id));
    }

    #[test]
    fn test_remove_releases_every_record() {
        let mut state = LedgerState::new();
        state.store(bundle("POOL01"));
        state.store(bundle("POOL02"));
        let pool_id: PoolId = "POOL01".parse().unwrap();

        state.remove(&pool_id);
        assert!(state.pool(&pool_id).is_none());
        assert!(state.vault(&pool_id).is_none());
        assert!(state.bid_state(&pool_id).is_none());
        assert!(state.member(&pool_id, "alice").is_none());
        assert_eq!(state.num_pools(), 1);
    }

    #[test]
    fn test_conservation_detects_drift() {
        let mut b = bundle("POOL01");
        b.vault.deposit_contribution(100);
        assert!(matches!(
            b.check_conservation(),
            Err(EngineError::ConservationViolated { .. })
        ));

        b.pool.add_contribution(100);
        b.member_mut("alice").unwrap().record_contribution(100, 0);
        assert!(b.check_conservation().is_ok());
    }

    #[test]
    fn test_from_records_rejects_orphan_member() {
        let b = bundle("POOL01");
        let stray = MemberRecord::new("mallory", *b.pool.id());
        let result = LedgerState::from_records(
            vec![b.pool],
            vec![stray],
            vec![b.bids],
            vec![b.vault],
            WalletBook::new(),
        );
        assert!(matches!(result, Err(EngineError::InvalidSnapshot(_))));
    }
}
