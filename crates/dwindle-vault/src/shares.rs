//! Share accounting.
//!
//! Shares are minted at `amount * total_shares / total_principal` and redeemed
//! at `shares * pool / total_shares`, both rounded down, so rounding never
//! creates principal the vault does not hold. The holder of the last shares
//! receives the exact remainder of the pool.

use std::collections::HashMap;

use dwindle_core::constants::BPS_PRECISION;
use dwindle_core::error::VaultError;
use dwindle_core::types::AccountId;

/// Shares minted for depositing `amount` into a pool of `total_principal`
/// backing `total_shares`. The first deposit mints 1:1.
pub fn shares_for_deposit(amount: u128, total_shares: u128, total_principal: u128) -> Result<u128, VaultError> {
    if total_shares == 0 || total_principal == 0 {
        return Ok(amount);
    }
    amount
        .checked_mul(total_shares)
        .map(|v| v / total_principal)
        .ok_or(VaultError::ArithmeticOverflow)
}

/// Principal owed for redeeming `shares` out of `total_shares` against `pool`.
pub fn amount_for_shares(shares: u128, total_shares: u128, pool: u128) -> Result<u128, VaultError> {
    if total_shares == 0 {
        return Ok(0);
    }
    if shares >= total_shares {
        return Ok(pool);
    }
    shares
        .checked_mul(pool)
        .map(|v| v / total_shares)
        .ok_or(VaultError::ArithmeticOverflow)
}

/// Split `reward` into `(fee, remainder)` at `fee_bps`.
pub fn split_fee(reward: u128, fee_bps: u128) -> Result<(u128, u128), VaultError> {
    let fee = reward
        .checked_mul(fee_bps)
        .ok_or(VaultError::ArithmeticOverflow)?
        / BPS_PRECISION;
    Ok((fee, reward - fee.min(reward)))
}

/// Per-account share balances.
#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    balances: HashMap<AccountId, u128>,
    total: u128,
}

impl ShareLedger {
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u128 {
        self.total
    }

    pub fn mint(&mut self, account: &AccountId, shares: u128) -> Result<(), VaultError> {
        let total = self.total.checked_add(shares).ok_or(VaultError::ArithmeticOverflow)?;
        let balance = self
            .balance_of(account)
            .checked_add(shares)
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.total = total;
        self.balances.insert(*account, balance);
        Ok(())
    }

    pub fn burn(&mut self, account: &AccountId, shares: u128) -> Result<(), VaultError> {
        let have = self.balance_of(account);
        if have < shares {
            return Err(VaultError::InsufficientShares { have, need: shares });
        }
        if have == shares {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, have - shares);
        }
        self.total -= shares;
        Ok(())
    }
}
