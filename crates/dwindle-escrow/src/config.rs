//! Escrow configuration.
//!
//! Provides [`EscrowConfig`] with defaults for token metadata and the maximum
//! lock duration. Configuration is built programmatically; there is no file
//! loading.

use dwindle_core::constants::{DEFAULT_MAX_LOCK_SECS, WEEK};
use dwindle_core::error::EscrowError;
use dwindle_core::types::AccountId;
use serde::{Deserialize, Serialize};

/// Configuration for a [`VotingEscrow`](crate::VotingEscrow) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Custody address holding every locked principal.
    pub address: AccountId,
    /// Operator allowed to manage the caller whitelist.
    pub owner: AccountId,
    /// Display name of the non-transferable voting token.
    pub name: String,
    /// Display symbol.
    pub symbol: String,
    /// Decimals, matching the principal token.
    pub decimals: u8,
    /// Longest allowed lock, in seconds.
    pub max_lock_secs: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            address: AccountId::repeat_byte(0xec),
            owner: AccountId::ZERO,
            name: "Vote-escrowed Token".to_string(),
            symbol: "veTOKEN".to_string(),
            decimals: 8,
            max_lock_secs: DEFAULT_MAX_LOCK_SECS,
        }
    }
}

impl EscrowConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EscrowError> {
        if self.max_lock_secs < WEEK {
            return Err(EscrowError::InvalidConfig(format!(
                "max_lock_secs {} is shorter than one week",
                self.max_lock_secs
            )));
        }
        if self.address.is_zero() {
            return Err(EscrowError::InvalidConfig("custody address is zero".into()));
        }
        Ok(())
    }
}
