//! Feeder configuration.

use dwindle_core::error::FeederError;
use dwindle_core::types::AccountId;
use serde::{Deserialize, Serialize};

/// Configuration for a [`RewardFeeder`](crate::RewardFeeder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederConfig {
    /// Address that holds the proxy token and receives pool rewards.
    pub address: AccountId,
    /// Operator allowed to stake and unstake.
    pub owner: AccountId,
    /// Pool the proxy token is staked in.
    pub pool_id: u64,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            address: AccountId::repeat_byte(0xfe),
            owner: AccountId::ZERO,
            pool_id: 0,
        }
    }
}

impl FeederConfig {
    pub fn validate(&self) -> Result<(), FeederError> {
        if self.address.is_zero() {
            return Err(FeederError::InvalidConfig("feeder address is zero".into()));
        }
        Ok(())
    }
}
