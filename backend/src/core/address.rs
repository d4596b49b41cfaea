//! Deterministic record addressing
//!
//! Every record the engine stores (pool, member record, vault, bid state) is
//! keyed by a SHA-256 digest of a seed constant plus stable seeds such as the
//! pool id and the member's identity. Callers never hold pointers into the
//! arena; they recompute the same address the engine expects.

use crate::constants::{BID_STATE_SEED, MEMBER_SEED, POOL_SEED, VAULT_SEED};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Length of a pool id in characters
pub const POOL_ID_LEN: usize = 6;

const POOL_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Error, PartialEq)]
pub enum PoolIdError {
    #[error("Pool id must be {POOL_ID_LEN} characters, got {0}")]
    InvalidLength(usize),

    #[error("Pool id may only contain A-Z and 0-9, got {0:?}")]
    InvalidCharacter(char),
}

/// Six-character alphanumeric pool identifier
///
/// # Example
/// ```
/// use rosca_core_rs::PoolId;
///
/// let id: PoolId = "AB12CD".parse().unwrap();
/// assert_eq!(id.to_string(), "AB12CD");
/// assert!("ab12cd".parse::<PoolId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoolId([u8; POOL_ID_LEN]);

impl PoolId {
    /// Generate a fresh random pool id from a v4 UUID
    pub fn generate() -> Self {
        let entropy = uuid::Uuid::new_v4();
        let mut id = [0u8; POOL_ID_LEN];
        for (slot, byte) in id.iter_mut().zip(entropy.as_bytes().iter()) {
            *slot = POOL_ID_ALPHABET[*byte as usize % POOL_ID_ALPHABET.len()];
        }
        PoolId(id)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::str::FromStr for PoolId {
    type Err = PoolIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != POOL_ID_LEN {
            return Err(PoolIdError::InvalidLength(s.len()));
        }
        let mut id = [0u8; POOL_ID_LEN];
        for (slot, ch) in id.iter_mut().zip(s.chars()) {
            if !ch.is_ascii_uppercase() && !ch.is_ascii_digit() {
                return Err(PoolIdError::InvalidCharacter(ch));
            }
            *slot = ch as u8;
        }
        Ok(PoolId(id))
    }
}

impl TryFrom<String> for PoolId {
    type Error = PoolIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PoolId> for String {
    fn from(id: PoolId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Constructors only admit ASCII alphanumerics
        for byte in self.0 {
            write!(f, "{}", byte as char)?;
        }
        Ok(())
    }
}

/// 32-byte content-derived record address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// Hash the seeds, length-prefixed so adjacent seeds cannot alias
    pub fn derive(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update((seed.len() as u32).to_le_bytes());
            hasher.update(seed);
        }
        Address(hasher.finalize().into())
    }

    pub fn pool(pool_id: &PoolId) -> Self {
        Self::derive(&[POOL_SEED, pool_id.as_bytes()])
    }

    pub fn member(pool_id: &PoolId, owner: &str) -> Self {
        let pool = Self::pool(pool_id);
        Self::derive(&[MEMBER_SEED, &pool.0, owner.as_bytes()])
    }

    pub fn vault(pool_id: &PoolId) -> Self {
        let pool = Self::pool(pool_id);
        Self::derive(&[VAULT_SEED, &pool.0])
    }

    pub fn bid_state(pool_id: &PoolId) -> Self {
        let pool = Self::pool(pool_id);
        Self::derive(&[BID_STATE_SEED, &pool.0])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
