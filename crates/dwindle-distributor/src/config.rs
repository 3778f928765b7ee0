//! Distributor configuration.

use dwindle_core::constants::DEFAULT_TOKEN_CHECKPOINT_DEADLINE_SECS;
use dwindle_core::error::DistributorError;
use dwindle_core::types::AccountId;
use serde::{Deserialize, Serialize};

/// Configuration for a [`RewardDistributor`](crate::RewardDistributor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// Address holding undistributed rewards.
    pub address: AccountId,
    /// Operator allowed to fund epochs, checkpoint tokens and kill.
    pub owner: AccountId,
    /// First rewarded instant; rounded down to a week for the first epoch.
    pub start_time: u64,
    /// Receives the remaining balance when the distributor is killed.
    pub emergency_return: AccountId,
    /// Whether anyone may checkpoint tokens once the deadline has elapsed.
    pub can_checkpoint_token: bool,
    /// Minimum gap between permissionless token checkpoints.
    pub token_checkpoint_deadline_secs: u64,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            address: AccountId::repeat_byte(0xd1),
            owner: AccountId::ZERO,
            start_time: 0,
            emergency_return: AccountId::ZERO,
            can_checkpoint_token: false,
            token_checkpoint_deadline_secs: DEFAULT_TOKEN_CHECKPOINT_DEADLINE_SECS,
        }
    }
}

impl DistributorConfig {
    pub fn validate(&self) -> Result<(), DistributorError> {
        if self.address.is_zero() {
            return Err(DistributorError::InvalidConfig("distributor address is zero".into()));
        }
        Ok(())
    }
}
