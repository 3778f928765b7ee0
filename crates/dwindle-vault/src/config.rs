//! Vault configuration.

use dwindle_core::constants::{BPS_PRECISION, DEFAULT_MAX_LOCK_SECS, WEEK};
use dwindle_core::error::VaultError;
use dwindle_core::types::AccountId;
use serde::{Deserialize, Serialize};

/// Configuration for a [`CompoundingVault`](crate::CompoundingVault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// The vault's own account: holds idle principal and owns the escrow lock.
    pub address: AccountId,
    /// Operator allowed to create and extend the lock, harvest and set fees.
    pub owner: AccountId,
    /// Receives the harvest fee.
    pub treasury: AccountId,
    /// Harvest fee in basis points.
    pub treasury_fee_bps: u128,
    /// How far ahead the shared lock is set when created or extended.
    pub lock_duration_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: AccountId::repeat_byte(0x7a),
            owner: AccountId::ZERO,
            treasury: AccountId::ZERO,
            treasury_fee_bps: 0,
            lock_duration_secs: DEFAULT_MAX_LOCK_SECS,
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.treasury_fee_bps > BPS_PRECISION {
            return Err(VaultError::InvalidFee(self.treasury_fee_bps));
        }
        if self.lock_duration_secs < WEEK {
            return Err(VaultError::InvalidConfig(format!(
                "lock duration {} is shorter than one week",
                self.lock_duration_secs
            )));
        }
        if self.address.is_zero() {
            return Err(VaultError::InvalidConfig("vault address is zero".into()));
        }
        Ok(())
    }
}
