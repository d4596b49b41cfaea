//! Checkpoint - Save/Load Engine State
//!
//! Serializes the complete ledger (pools, member records, bid states,
//! vaults, wallets, event log) so an engine can be stopped and resumed.
//!
//! # Critical Invariants
//!
//! - **Registry Matching**: state can only be restored against the registry
//!   it was taken with
//! - **Address Integrity**: every record re-derives to the address it is
//!   stored under
//! - **Conservation**: every pool balances, and wallets plus vaults add up
//!   to everything ever funded

use crate::error::EngineError;
use crate::models::bid::BidState;
use crate::models::event::{Event, EventLog};
use crate::models::member::MemberRecord;
use crate::models::pool::Pool;
use crate::models::registry::ProtocolRegistry;
use crate::models::state::LedgerState;
use crate::models::vault::Vault;
use crate::models::wallet::{Wallet, WalletBook};
use crate::orchestrator::engine::SettlementEngine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete engine state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub pools: Vec<Pool>,
    pub members: Vec<MemberRecord>,
    pub bid_states: Vec<BidState>,
    pub vaults: Vec<Vault>,
    pub wallets: Vec<Wallet>,
    /// Lifetime external funding (for global conservation)
    pub total_funded: i64,
    pub events: Vec<Event>,
    /// SHA256 of the registry the snapshot was taken with
    pub registry_hash: String,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::Serialization(format!("Snapshot serialization failed: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::Serialization(format!("Snapshot parse failed: {}", e)))
    }
}

// ============================================================================
// Registry Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of any serializable config
///
/// Object keys are sorted before hashing so field order never matters.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, EngineError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config)
        .map_err(|e| EngineError::Serialization(format!("Config serialization failed: {}", e)))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| EngineError::Serialization(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Save / Restore
// ============================================================================

impl SettlementEngine {
    pub fn snapshot(&self, registry: &ProtocolRegistry) -> Result<EngineSnapshot, EngineError> {
        let wallets = self.state.wallets();
        Ok(EngineSnapshot {
            pools: self.state.pools().cloned().collect(),
            members: self.state.member_records().cloned().collect(),
            bid_states: self.state.bid_states().cloned().collect(),
            vaults: self.state.vaults().cloned().collect(),
            wallets: wallets.iter().cloned().collect(),
            total_funded: wallets.total_funded(),
            events: self.events.events().to_vec(),
            registry_hash: compute_config_hash(registry)?,
        })
    }

    /// Rebuild an engine from a snapshot, validating it first
    pub fn restore(snapshot: EngineSnapshot, registry: &ProtocolRegistry) -> Result<Self, EngineError> {
        let expected = compute_config_hash(registry)?;
        if snapshot.registry_hash != expected {
            return Err(EngineError::InvalidSnapshot(format!(
                "registry hash mismatch: snapshot {}, current {}",
                snapshot.registry_hash, expected
            )));
        }

        let wallets = WalletBook::from_parts(snapshot.wallets, snapshot.total_funded);
        let state = LedgerState::from_records(
            snapshot.pools,
            snapshot.members,
            snapshot.bid_states,
            snapshot.vaults,
            wallets,
        )?;
        validate_state(&state)?;

        let mut events = EventLog::new();
        for event in snapshot.events {
            events.log(event);
        }
        Ok(SettlementEngine::from_parts(state, events))
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Check per-pool and global conservation on a rebuilt ledger
pub fn validate_state(state: &LedgerState) -> Result<(), EngineError> {
    for pool_id in state.pool_ids() {
        let bundle = state.load(&pool_id)?;
        if bundle.members.len() != bundle.pool.members().len() {
            return Err(EngineError::InvalidSnapshot(format!(
                "pool {} has duplicate seats",
                pool_id
            )));
        }
        bundle.check_conservation()?;
    }

    let wallets = state.wallets();
    let held = wallets.total_balance() + state.total_custody();
    if held != wallets.total_funded() {
        return Err(EngineError::InvalidSnapshot(format!(
            "funds not conserved: wallets and vaults hold {}, funded {}",
            held,
            wallets.total_funded()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        let a = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        let b = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        assert_eq!(compute_config_hash(&a).unwrap(), compute_config_hash(&b).unwrap());
    }

    #[test]
    fn test_compute_config_hash_differs() {
        let a = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        let b = ProtocolRegistry::initialize("admin", "treasury", 101).unwrap();
        assert_ne!(compute_config_hash(&a).unwrap(), compute_config_hash(&b).unwrap());
    }

    #[test]
    fn test_empty_engine_round_trip() {
        let registry = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        let mut engine = SettlementEngine::new();
        engine.fund_wallet("alice", 500).unwrap();

        let json = engine.snapshot(&registry).unwrap().to_json().unwrap();
        let restored =
            SettlementEngine::restore(EngineSnapshot::from_json(&json).unwrap(), &registry).unwrap();
        assert_eq!(restored.wallet_balance("alice"), 500);
    }

    #[test]
    fn test_tampered_wallet_rejected() {
        let registry = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        let mut engine = SettlementEngine::new();
        engine.fund_wallet("alice", 500).unwrap();

        let mut snapshot = engine.snapshot(&registry).unwrap();
        snapshot.wallets = vec![Wallet::new("alice".to_string(), 900)];
        assert!(matches!(
            SettlementEngine::restore(snapshot, &registry),
            Err(EngineError::InvalidSnapshot(_))
        ));
    }
}
