//! In-memory token ledgers.
//!
//! A [`TokenBank`] holds any number of token ledgers keyed by token address.
//! [`MemoryToken`] is a cheap cloneable handle onto one of them and implements
//! [`FungibleToken`]. Handles cloned from the same bank share state, so the
//! escrow, the vault and the test harness all observe the same balances.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TokenError;
use crate::traits::FungibleToken;
use crate::types::AccountId;

/// Balances and allowances of a single token.
#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<AccountId, u128>,
    allowances: HashMap<(AccountId, AccountId), u128>,
    total_supply: u128,
}

impl Ledger {
    fn balance(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn move_balance(&mut self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), TokenError> {
        let have = self.balance(from);
        if have < amount {
            return Err(TokenError::InsufficientBalance { have, need: amount });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        self.balances.insert(*from, have - amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

/// Shared registry of in-memory token ledgers.
#[derive(Debug, Clone, Default)]
pub struct TokenBank {
    ledgers: Arc<Mutex<HashMap<AccountId, Ledger>>>,
}

impl TokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token at `address` (no-op if it already exists) and return a handle.
    pub fn deploy(&self, address: AccountId) -> MemoryToken {
        self.ledgers.lock().entry(address).or_default();
        MemoryToken {
            bank: self.clone(),
            address,
        }
    }

    /// Handle onto an already deployed token.
    pub fn token(&self, address: &AccountId) -> Result<MemoryToken, TokenError> {
        if self.ledgers.lock().contains_key(address) {
            Ok(MemoryToken {
                bank: self.clone(),
                address: *address,
            })
        } else {
            Err(TokenError::UnknownToken(address.to_string()))
        }
    }
}

/// Handle onto one token ledger inside a [`TokenBank`].
#[derive(Debug, Clone)]
pub struct MemoryToken {
    bank: TokenBank,
    address: AccountId,
}

impl MemoryToken {
    fn with_ledger<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut ledgers = self.bank.ledgers.lock();
        f(ledgers.entry(self.address).or_default())
    }

    /// Create `amount` new tokens for `to`.
    pub fn mint(&self, to: &AccountId, amount: u128) {
        self.with_ledger(|l| {
            *l.balances.entry(*to).or_insert(0) += amount;
            l.total_supply += amount;
        });
    }

    /// Total tokens minted.
    pub fn total_supply(&self) -> u128 {
        self.with_ledger(|l| l.total_supply)
    }
}

impl FungibleToken for MemoryToken {
    fn address(&self) -> AccountId {
        self.address
    }

    fn balance_of(&self, account: &AccountId) -> u128 {
        self.with_ledger(|l| l.balance(account))
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128 {
        self.with_ledger(|l| l.allowance(owner, spender))
    }

    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: u128) {
        self.with_ledger(|l| {
            l.allowances.insert((*owner, *spender), amount);
        });
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), TokenError> {
        self.with_ledger(|l| l.move_balance(from, to, amount))?;
        debug!(token = %self.address, %from, %to, amount, "token: transfer");
        Ok(())
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.with_ledger(|l| {
            let allowed = l.allowance(from, spender);
            if spender != from && allowed < amount {
                return Err(TokenError::InsufficientAllowance { have: allowed, need: amount });
            }
            l.move_balance(from, to, amount)?;
            if spender != from && allowed != u128::MAX {
                l.allowances.insert((*from, *spender), allowed - amount);
            }
            Ok(())
        })?;
        debug!(token = %self.address, %spender, %from, %to, amount, "token: transfer_from");
        Ok(())
    }
}
