//! Staged pool transaction
//!
//! An operation works on a cloned [`PoolBundle`] and records the wallet
//! movements and events it would cause. Nothing reaches the ledger until
//! [`PoolTx::commit`], which first re-checks conservation. Dropping a
//! `PoolTx` discards everything it staged.
//!
//! # Critical Invariants
//!
//! - **Atomicity**: bundle, wallets and events are applied together or not at all
//! - **No overdraft**: staged debits never exceed a wallet's balance

use crate::core::address::PoolId;
use crate::error::EngineError;
use crate::models::event::{Event, EventLog};
use crate::models::state::{LedgerState, PoolBundle};
use crate::models::vault::VaultError;
use crate::models::wallet::{WalletBook, WalletError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transfer {
    Debit { owner: String, amount: i64 },
    Credit { owner: String, amount: i64 },
}

#[derive(Debug, Clone)]
pub struct PoolTx {
    pub bundle: PoolBundle,
    transfers: Vec<Transfer>,
    events: Vec<Event>,
    now: u64,
}

impl PoolTx {
    /// Start a transaction against an existing pool
    pub fn begin(state: &LedgerState, pool_id: &PoolId, now: u64) -> Result<Self, EngineError> {
        Ok(Self::with_bundle(state.load(pool_id)?, now))
    }

    /// Start a transaction for a pool that does not exist yet
    pub fn with_bundle(bundle: PoolBundle, now: u64) -> Self {
        Self {
            bundle,
            transfers: Vec::new(),
            events: Vec::new(),
            now,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn pool_id(&self) -> PoolId {
        *self.bundle.pool.id()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn pending_debits(&self, owner: &str) -> i64 {
        self.transfers
            .iter()
            .map(|t| match t {
                Transfer::Debit { owner: o, amount } if o == owner => *amount,
                _ => 0,
            })
            .sum()
    }

    fn pending_credits(&self, owner: &str) -> i64 {
        self.transfers
            .iter()
            .map(|t| match t {
                Transfer::Credit { owner: o, amount } if o == owner => *amount,
                _ => 0,
            })
            .fold(0i64, i64::saturating_add)
    }

    /// Stage a debit from an external wallet
    pub fn debit_wallet(
        &mut self,
        wallets: &WalletBook,
        owner: &str,
        amount: i64,
    ) -> Result<(), EngineError> {
        if amount <= 0 {
            return Err(WalletError::NonPositive(amount).into());
        }
        let available = wallets.balance(owner) - self.pending_debits(owner);
        if available < amount {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available,
            }
            .into());
        }
        self.transfers.push(Transfer::Debit {
            owner: owner.to_string(),
            amount,
        });
        Ok(())
    }

    /// Stage a credit to an external wallet; zero amounts are skipped
    pub fn credit_wallet(&mut self, owner: &str, amount: i64) {
        if amount > 0 {
            self.transfers.push(Transfer::Credit {
                owner: owner.to_string(),
                amount,
            });
        }
    }

    /// Pay `amount` out of the pot to `owner`
    pub fn disburse(&mut self, owner: &str, amount: i64) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        self.bundle
            .vault
            .disburse(amount)
            .map_err(EngineError::InsufficientPoolFunds)?;
        self.credit_wallet(owner, amount);
        Ok(())
    }

    /// Route a fee out of the pot to `treasury`
    pub fn route_fee(&mut self, treasury: &str, amount: i64) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        self.bundle
            .vault
            .route_fee(amount)
            .map_err(EngineError::InsufficientPoolFunds)?;
        self.credit_wallet(treasury, amount);
        Ok(())
    }

    /// Release staked collateral to `owner` (return or penalty)
    pub fn release_collateral(&mut self, owner: &str, amount: i64) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        self.bundle
            .vault
            .release_collateral(amount)
            .map_err(EngineError::InsufficientPoolFunds)?;
        self.credit_wallet(owner, amount);
        Ok(())
    }

    pub fn collateral_to_pot(&mut self, amount: i64) -> Result<(), VaultError> {
        self.bundle.vault.collateral_to_pot(amount)
    }

    /// Verify and apply everything staged
    pub fn commit(self, state: &mut LedgerState, log: &mut EventLog) -> Result<(), EngineError> {
        self.bundle.check_conservation()?;

        for transfer in &self.transfers {
            match transfer {
                Transfer::Debit { owner, .. } => {
                    let required = self.pending_debits(owner);
                    let available = state.wallets().balance(owner);
                    if available < required {
                        return Err(WalletError::InsufficientFunds {
                            required,
                            available,
                        }
                        .into());
                    }
                }
                Transfer::Credit { owner, .. } => {
                    let balance = state.wallets().balance(owner);
                    let amount = self.pending_credits(owner);
                    if balance.checked_add(amount).is_none() {
                        return Err(WalletError::Overflow { balance, amount }.into());
                    }
                }
            }
        }

        let wallets = state.wallets_mut();
        for transfer in self.transfers {
            match transfer {
                Transfer::Debit { owner, amount } => wallets.debit(&owner, amount)?,
                Transfer::Credit { owner, amount } => wallets.credit(&owner, amount)?,
            }
        }
        state.store(self.bundle);
        log.extend(self.events);
        Ok(())
    }
}
