//! Pool vault
//!
//! Custodial balance of one pool, split into two buckets:
//! - **contributions**: this cycle's uncommitted pot
//! - **collateral**: members' staked security
//!
//! Only the settlement engine mutates a vault. Lifetime outflow counters
//! feed the conservation check run after every operation.

use crate::core::address::PoolId;
use crate::models::pool::Asset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VaultError {
    #[error("contributions bucket holds {available}, needs {required}")]
    InsufficientContributions { required: i64, available: i64 },

    #[error("collateral bucket holds {available}, needs {required}")]
    InsufficientCollateral { required: i64, available: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pool_id: PoolId,
    asset: Asset,
    contribution_balance: i64,
    collateral_balance: i64,
    /// Lifetime net payouts, dividends and refunds taken from the pot
    total_disbursed: i64,
    /// Lifetime protocol and early-withdrawal fees taken from the pot
    total_fees_routed: i64,
}

impl Vault {
    pub fn new(pool_id: PoolId, asset: Asset) -> Self {
        Self {
            pool_id,
            asset,
            contribution_balance: 0,
            collateral_balance: 0,
            total_disbursed: 0,
            total_fees_routed: 0,
        }
    }

    pub fn pool_id(&self) -> &PoolId {
        &self.pool_id
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn contribution_balance(&self) -> i64 {
        self.contribution_balance
    }

    pub fn collateral_balance(&self) -> i64 {
        self.collateral_balance
    }

    pub fn balance(&self) -> i64 {
        self.contribution_balance + self.collateral_balance
    }

    pub fn total_disbursed(&self) -> i64 {
        self.total_disbursed
    }

    pub fn total_fees_routed(&self) -> i64 {
        self.total_fees_routed
    }

    pub(crate) fn deposit_contribution(&mut self, amount: i64) {
        self.contribution_balance += amount;
    }

    pub(crate) fn deposit_collateral(&mut self, amount: i64) {
        self.collateral_balance += amount;
    }

    fn take_contributions(&mut self, amount: i64) -> Result<(), VaultError> {
        if amount > self.contribution_balance {
            return Err(VaultError::InsufficientContributions {
                required: amount,
                available: self.contribution_balance,
            });
        }
        self.contribution_balance -= amount;
        Ok(())
    }

    fn take_collateral(&mut self, amount: i64) -> Result<(), VaultError> {
        if amount > self.collateral_balance {
            return Err(VaultError::InsufficientCollateral {
                required: amount,
                available: self.collateral_balance,
            });
        }
        self.collateral_balance -= amount;
        Ok(())
    }

    /// Pay out of the pot to a member
    pub(crate) fn disburse(&mut self, amount: i64) -> Result<(), VaultError> {
        self.take_contributions(amount)?;
        self.total_disbursed += amount;
        Ok(())
    }

    /// Route a fee out of the pot to the treasury
    pub(crate) fn route_fee(&mut self, amount: i64) -> Result<(), VaultError> {
        self.take_contributions(amount)?;
        self.total_fees_routed += amount;
        Ok(())
    }

    /// Release staked collateral out of the vault (return or penalty)
    pub(crate) fn release_collateral(&mut self, amount: i64) -> Result<(), VaultError> {
        self.take_collateral(amount)
    }

    /// Move collateral into the pot to cover a missed contribution
    pub(crate) fn collateral_to_pot(&mut self, amount: i64) -> Result<(), VaultError> {
        self.take_collateral(amount)?;
        self.contribution_balance += amount;
        Ok(())
    }

    pub(crate) fn from_parts(
        pool_id: PoolId,
        asset: Asset,
        contribution_balance: i64,
        collateral_balance: i64,
        total_disbursed: i64,
        total_fees_routed: i64,
    ) -> Self {
        Self {
            pool_id,
            asset,
            contribution_balance,
            collateral_balance,
            total_disbursed,
            total_fees_routed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault {
        Vault::new("VAULT1".parse().unwrap(), Asset::Native)
    }

    #[test]
    fn test_buckets_are_separate() {
        let mut vault = vault();
        vault.deposit_contribution(300);
        vault.deposit_collateral(200);
        assert_eq!(vault.balance(), 500);

        let err = vault.disburse(301).unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientContributions {
                required: 301,
                available: 300
            }
        );
        assert_eq!(vault.balance(), 500);
    }

    #[test]
    fn test_outflows_are_tallied() {
        let mut vault = vault();
        vault.deposit_contribution(300);
        vault.disburse(297).unwrap();
        vault.route_fee(3).unwrap();
        assert_eq!(vault.balance(), 0);
        assert_eq!(vault.total_disbursed(), 297);
        assert_eq!(vault.total_fees_routed(), 3);
    }

    #[test]
    fn test_collateral_to_pot() {
        let mut vault = vault();
        vault.deposit_collateral(250);
        vault.collateral_to_pot(100).unwrap();
        assert_eq!(vault.collateral_balance(), 150);
        assert_eq!(vault.contribution_balance(), 100);
        assert!(vault.collateral_to_pot(151).is_err());
    }
}
