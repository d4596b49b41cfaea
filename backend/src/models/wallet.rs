//! External wallet model
//!
//! A wallet is a participant's balance outside any pool. Contributions and
//! collateral deposits debit it; payouts, dividends, refunds and collateral
//! returns credit it. Wallets never go negative.
//!
//! CRITICAL: All money values are i64 (minor units)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during wallet operations
#[derive(Debug, Error, PartialEq)]
pub enum WalletError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Wallet amount must be positive, got {0}")]
    NonPositive(i64),

    #[error("Crediting {amount} would overflow a balance of {balance}")]
    Overflow { balance: i64, amount: i64 },
}

/// One identity's external balance
///
/// # Example
/// ```
/// use rosca_core_rs::Wallet;
///
/// let mut wallet = Wallet::new("alice".to_string(), 1_000);
/// wallet.debit(300).unwrap();
/// assert_eq!(wallet.balance(), 700);
/// assert!(wallet.debit(701).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    owner: String,
    balance: i64,
}

impl Wallet {
    pub fn new(owner: String, balance: i64) -> Self {
        assert!(balance >= 0, "opening balance must be non-negative");
        Self { owner, balance }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn can_pay(&self, amount: i64) -> bool {
        amount <= self.balance
    }

    /// Debit the wallet, failing without change if the balance is short
    pub fn debit(&mut self, amount: i64) -> Result<(), WalletError> {
        if amount <= 0 {
            return Err(WalletError::NonPositive(amount));
        }
        if !self.can_pay(amount) {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: i64) -> Result<(), WalletError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::Overflow {
                balance: self.balance,
                amount,
            })?;
        Ok(())
    }
}

/// All external wallets known to the engine, keyed by owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletBook {
    wallets: BTreeMap<String, Wallet>,
    /// Total ever credited from outside the engine
    total_funded: i64,
}

impl WalletBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit funds arriving from outside the system
    pub fn fund(&mut self, owner: &str, amount: i64) -> Result<(), WalletError> {
        if amount <= 0 {
            return Err(WalletError::NonPositive(amount));
        }
        let total_funded = self
            .total_funded
            .checked_add(amount)
            .ok_or(WalletError::Overflow {
                balance: self.total_funded,
                amount,
            })?;
        self.credit(owner, amount)?;
        self.total_funded = total_funded;
        Ok(())
    }

    pub fn balance(&self, owner: &str) -> i64 {
        self.wallets.get(owner).map(Wallet::balance).unwrap_or(0)
    }

    pub fn get(&self, owner: &str) -> Option<&Wallet> {
        self.wallets.get(owner)
    }

    pub fn debit(&mut self, owner: &str, amount: i64) -> Result<(), WalletError> {
        match self.wallets.get_mut(owner) {
            Some(wallet) => wallet.debit(amount),
            None => Err(WalletError::InsufficientFunds {
                required: amount,
                available: 0,
            }),
        }
    }

    pub fn credit(&mut self, owner: &str, amount: i64) -> Result<(), WalletError> {
        self.wallets
            .entry(owner.to_string())
            .or_insert_with(|| Wallet::new(owner.to_string(), 0))
            .credit(amount)
    }

    pub fn total_funded(&self) -> i64 {
        self.total_funded
    }

    /// Sum of all wallet balances
    pub fn total_balance(&self) -> i64 {
        self.wallets.values().map(Wallet::balance).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    pub(crate) fn from_parts(wallets: Vec<Wallet>, total_funded: i64) -> Self {
        Self {
            wallets: wallets
                .into_iter()
                .map(|wallet| (wallet.owner.clone(), wallet))
                .collect(),
            total_funded,
        }
    }
}
