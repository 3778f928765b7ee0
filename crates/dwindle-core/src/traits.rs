//! Collaborator interfaces for Dwindle.
//!
//! These traits describe the external services the ledger and its consumers
//! call into, specified only at their call boundary:
//! - [`Clock`]: current chain head (block number and timestamp)
//! - [`FungibleToken`]: atomic, all-or-nothing token transfers
//! - [`SwapRouter`]: exchange one token for another along a path
//! - [`StakingPool`]: external staking pool the reward feeder deposits into
//!
//! All methods take `&self`: each collaborator owns its own state, the way an
//! external contract would. Implementations must be all-or-nothing: an `Err`
//! leaves their state untouched.

use crate::error::{PoolError, RouterError, TokenError};
use crate::types::{AccountId, BlockInfo};

/// Source of the current chain head.
pub trait Clock: Send + Sync {
    /// The block currently being executed.
    fn now(&self) -> BlockInfo;
}

/// A fungible token ledger.
pub trait FungibleToken: Send + Sync {
    /// Address identifying this token (used in swap paths).
    fn address(&self) -> AccountId;

    /// Balance of `account` in base units.
    fn balance_of(&self, account: &AccountId) -> u128;

    /// Amount `spender` may still move out of `owner`'s balance.
    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128;

    /// Set `spender`'s allowance over `owner`'s balance to `amount`.
    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: u128);

    /// Move `amount` from `from` to `to`.
    fn transfer(&self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance.
    ///
    /// `u128::MAX` allowances are treated as unlimited and never decremented.
    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError>;
}

/// Token swap service.
pub trait SwapRouter: Send + Sync {
    /// Address the caller must approve before swapping.
    fn address(&self) -> AccountId;

    /// Quote the output of swapping `amount_in` along `path`.
    fn get_amount_out(&self, path: &[AccountId], amount_in: u128) -> Result<u128, RouterError>;

    /// Swap exactly `amount_in` of `path[0]` held by `caller` into `path[last]`, paid to `to`.
    ///
    /// Fails atomically if the output is below `min_out` or `deadline` has passed.
    fn swap_exact_tokens_for_tokens(
        &self,
        caller: &AccountId,
        path: &[AccountId],
        amount_in: u128,
        min_out: u128,
        deadline: u64,
        to: &AccountId,
    ) -> Result<u128, RouterError>;
}

/// External staking pool that accrues rewards to stakers.
pub trait StakingPool: Send + Sync {
    /// Address the caller must approve before depositing.
    fn address(&self) -> AccountId;

    /// Stake `amount` of the pool's staking token from `caller`.
    fn deposit(&self, caller: &AccountId, pool_id: u64, amount: u128) -> Result<(), PoolError>;

    /// Unstake `amount` back to `caller`.
    fn withdraw(&self, caller: &AccountId, pool_id: u64, amount: u128) -> Result<(), PoolError>;

    /// Pay `caller`'s pending rewards to `caller`. Returns the amount paid.
    fn harvest(&self, caller: &AccountId, pool_id: u64) -> Result<u128, PoolError>;

    /// Rewards `caller` could harvest right now.
    fn pending_reward(&self, caller: &AccountId, pool_id: u64) -> u128;
}
