//! The reward feeder.

use std::sync::Arc;

use dwindle_core::error::FeederError;
use dwindle_core::traits::{FungibleToken, StakingPool};
use dwindle_core::types::{AccountId, Caller};
use dwindle_distributor::RewardDistributor;
use tracing::{info, warn};

use crate::config::FeederConfig;

/// Stakes a proxy token in a staking pool and forwards the pool's rewards to
/// a distributor.
pub struct RewardFeeder {
    config: FeederConfig,
    proxy_token: Arc<dyn FungibleToken>,
    reward_token: Arc<dyn FungibleToken>,
    pool: Arc<dyn StakingPool>,
}

impl RewardFeeder {
    pub fn new(
        config: FeederConfig,
        proxy_token: Arc<dyn FungibleToken>,
        reward_token: Arc<dyn FungibleToken>,
        pool: Arc<dyn StakingPool>,
    ) -> Result<Self, FeederError> {
        config.validate()?;
        info!(address = %config.address, pool_id = config.pool_id, "feeder: deployed");
        Ok(Self {
            config,
            proxy_token,
            reward_token,
            pool,
        })
    }

    fn only_owner(&self, caller: &Caller, action: &str) -> Result<(), FeederError> {
        if caller.sender != self.config.owner {
            warn!(sender = %caller.sender, action, "feeder: rejected operator call");
            return Err(FeederError::Unauthorized(format!(
                "{} may not {action}",
                caller.sender
            )));
        }
        Ok(())
    }

    /// Stake `amount` of the feeder's proxy-token balance.
    pub fn pool_deposit(&self, caller: &Caller, amount: u128) -> Result<(), FeederError> {
        self.only_owner(caller, "stake")?;
        if amount == 0 {
            return Err(FeederError::InvalidAmount);
        }
        let address = self.config.address;
        self.proxy_token.approve(&address, &self.pool.address(), amount);
        let result = self.pool.deposit(&address, self.config.pool_id, amount);
        self.proxy_token.approve(&address, &self.pool.address(), 0);
        result?;
        info!(amount, pool_id = self.config.pool_id, "feeder: staked");
        Ok(())
    }

    /// Unstake `amount` back into the feeder.
    pub fn pool_withdraw(&self, caller: &Caller, amount: u128) -> Result<(), FeederError> {
        self.only_owner(caller, "unstake")?;
        if amount == 0 {
            return Err(FeederError::InvalidAmount);
        }
        self.pool
            .withdraw(&self.config.address, self.config.pool_id, amount)?;
        info!(amount, pool_id = self.config.pool_id, "feeder: unstaked");
        Ok(())
    }

    /// Harvest the pool and push the feeder's whole reward balance into
    /// `distributor`. Anyone may call it. Returns the amount fed.
    pub fn feed(&self, caller: &Caller, distributor: &mut RewardDistributor) -> Result<u128, FeederError> {
        let address = self.config.address;
        if distributor.reward_token() != self.reward_token.address() {
            return Err(FeederError::InvalidConfig(format!(
                "distributor pays {}, feeder harvests {}",
                distributor.reward_token(),
                self.reward_token.address()
            )));
        }
        let harvested = self.pool.harvest(&address, self.config.pool_id)?;
        let amount = self.reward_token.balance_of(&address);
        if amount == 0 {
            return Ok(0);
        }

        self.reward_token.approve(&address, &distributor.address(), amount);
        let result = distributor.feed(&Caller::relayed(address, caller.origin), amount);
        self.reward_token.approve(&address, &distributor.address(), 0);
        result?;
        info!(harvested, amount, by = %caller.sender, "feeder: fed distributor");
        Ok(amount)
    }

    /// Rewards the pool would pay the feeder right now.
    pub fn pending_reward(&self) -> u128 {
        self.pool.pending_reward(&self.config.address, self.config.pool_id)
    }

    pub fn address(&self) -> AccountId {
        self.config.address
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }
}
