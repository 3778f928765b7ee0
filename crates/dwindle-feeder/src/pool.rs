//! In-memory staking pool.
//!
//! [`MemoryStakingPool`] keeps stakes per pool id and pays rewards in a single
//! reward token. Rewards are credited by the operator through
//! [`accrue`](MemoryStakingPool::accrue), split over the current stakers in
//! proportion to their stake; the reward liquidity itself must be minted to
//! the pool's address.

use std::collections::HashMap;
use std::sync::Arc;

use dwindle_core::error::PoolError;
use dwindle_core::traits::{FungibleToken, StakingPool};
use dwindle_core::types::AccountId;
use parking_lot::Mutex;
use tracing::debug;

struct PoolState {
    staking_token: Arc<dyn FungibleToken>,
    stakes: HashMap<AccountId, u128>,
    total_staked: u128,
    pending: HashMap<AccountId, u128>,
}

/// Staking pool with operator-credited rewards.
pub struct MemoryStakingPool {
    address: AccountId,
    reward_token: Arc<dyn FungibleToken>,
    pools: Mutex<HashMap<u64, PoolState>>,
}

impl MemoryStakingPool {
    pub fn new(address: AccountId, reward_token: Arc<dyn FungibleToken>) -> Self {
        Self {
            address,
            reward_token,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Open pool `pool_id` staking `staking_token`. Re-adding keeps the
    /// existing pool.
    pub fn add_pool(&self, pool_id: u64, staking_token: Arc<dyn FungibleToken>) {
        self.pools.lock().entry(pool_id).or_insert_with(|| PoolState {
            staking_token,
            stakes: HashMap::new(),
            total_staked: 0,
            pending: HashMap::new(),
        });
    }

    /// Credit `amount` of rewards to the stakers of `pool_id`, pro rata.
    ///
    /// Returns the amount actually credited; rounding dust and rewards
    /// accrued to an empty pool are not credited.
    pub fn accrue(&self, pool_id: u64, amount: u128) -> Result<u128, PoolError> {
        let mut pools = self.pools.lock();
        let pool = pools.get_mut(&pool_id).ok_or(PoolError::UnknownPool(pool_id))?;
        if pool.total_staked == 0 {
            return Ok(0);
        }
        let mut credited = 0u128;
        for (account, stake) in &pool.stakes {
            let share = amount.saturating_mul(*stake) / pool.total_staked;
            if share > 0 {
                *pool.pending.entry(*account).or_insert(0) += share;
                credited += share;
            }
        }
        debug!(pool_id, credited, "pool: rewards accrued");
        Ok(credited)
    }

    /// Amount `account` has staked in `pool_id`.
    pub fn staked(&self, pool_id: u64, account: &AccountId) -> u128 {
        self.pools
            .lock()
            .get(&pool_id)
            .and_then(|p| p.stakes.get(account).copied())
            .unwrap_or(0)
    }
}

impl StakingPool for MemoryStakingPool {
    fn address(&self) -> AccountId {
        self.address
    }

    fn deposit(&self, caller: &AccountId, pool_id: u64, amount: u128) -> Result<(), PoolError> {
        let mut pools = self.pools.lock();
        let pool = pools.get_mut(&pool_id).ok_or(PoolError::UnknownPool(pool_id))?;
        pool.staking_token
            .transfer_from(&self.address, caller, &self.address, amount)?;
        *pool.stakes.entry(*caller).or_insert(0) += amount;
        pool.total_staked += amount;
        debug!(%caller, pool_id, amount, "pool: deposit");
        Ok(())
    }

    fn withdraw(&self, caller: &AccountId, pool_id: u64, amount: u128) -> Result<(), PoolError> {
        let mut pools = self.pools.lock();
        let pool = pools.get_mut(&pool_id).ok_or(PoolError::UnknownPool(pool_id))?;
        let have = pool.stakes.get(caller).copied().unwrap_or(0);
        if have < amount {
            return Err(PoolError::InsufficientStake { have, need: amount });
        }
        pool.staking_token.transfer(&self.address, caller, amount)?;
        pool.stakes.insert(*caller, have - amount);
        pool.total_staked -= amount;
        debug!(%caller, pool_id, amount, "pool: withdraw");
        Ok(())
    }

    fn harvest(&self, caller: &AccountId, pool_id: u64) -> Result<u128, PoolError> {
        let mut pools = self.pools.lock();
        let pool = pools.get_mut(&pool_id).ok_or(PoolError::UnknownPool(pool_id))?;
        let pending = pool.pending.get(caller).copied().unwrap_or(0);
        if pending == 0 {
            return Ok(0);
        }
        self.reward_token.transfer(&self.address, caller, pending)?;
        pool.pending.remove(caller);
        debug!(%caller, pool_id, pending, "pool: harvest");
        Ok(pending)
    }

    fn pending_reward(&self, caller: &AccountId, pool_id: u64) -> u128 {
        self.pools
            .lock()
            .get(&pool_id)
            .and_then(|p| p.pending.get(caller).copied())
            .unwrap_or(0)
    }
}
