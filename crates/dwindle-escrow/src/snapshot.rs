//! Persisted ledger state.
//!
//! [`EscrowState`] is the full ledger layout: locks, per-account and global
//! histories, the slope-change table, supply and the caller whitelist.
//! Collections are stored as vectors sorted by key so that encoding the same
//! ledger always yields the same bytes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dwindle_core::error::EscrowError;
use dwindle_core::traits::{Clock, FungibleToken};
use dwindle_core::types::{AccountId, Lock, Point};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EscrowConfig;
use crate::escrow::VotingEscrow;

/// Serializable image of a [`VotingEscrow`].
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct EscrowState {
    pub supply: u128,
    pub locks: Vec<(AccountId, Lock)>,
    pub point_history: Vec<Point>,
    pub user_point_history: Vec<(AccountId, Vec<Point>)>,
    pub slope_changes: Vec<(u64, i128)>,
    pub whitelisted: Vec<AccountId>,
}

impl EscrowState {
    /// Encode with bincode's standard configuration.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EscrowError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| EscrowError::Snapshot(e.to_string()))
    }

    /// Decode bytes produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EscrowError> {
        let (state, read) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| EscrowError::Snapshot(e.to_string()))?;
        if read != bytes.len() {
            return Err(EscrowError::Snapshot(format!(
                "{} trailing bytes",
                bytes.len() - read
            )));
        }
        Ok(state)
    }

    /// Reject states that could not have been produced by a running ledger.
    fn validate(&self) -> Result<(), EscrowError> {
        if self.point_history.is_empty() {
            return Err(EscrowError::Snapshot("global history has no genesis point".into()));
        }
        let ordered = |h: &[Point]| {
            h.windows(2).all(|w| {
                w[0].block_number <= w[1].block_number && w[0].timestamp <= w[1].timestamp
            })
        };
        if !ordered(&self.point_history) {
            return Err(EscrowError::Snapshot("global history out of order".into()));
        }
        if let Some((account, _)) = self.user_point_history.iter().find(|(_, h)| !ordered(h)) {
            return Err(EscrowError::Snapshot(format!("history of {account} out of order")));
        }
        let locked = self
            .locks
            .iter()
            .try_fold(0u128, |acc, (_, l)| acc.checked_add(l.amount))
            .ok_or(EscrowError::ArithmeticOverflow)?;
        if locked != self.supply {
            return Err(EscrowError::Snapshot(format!(
                "supply {} does not match locked total {locked}",
                self.supply
            )));
        }
        Ok(())
    }
}

impl VotingEscrow {
    /// Capture the full ledger state.
    pub fn snapshot(&self) -> EscrowState {
        let mut locks: Vec<_> = self.locks.iter().map(|(a, l)| (*a, *l)).collect();
        locks.sort_by_key(|(a, _)| *a);
        let mut user_point_history: Vec<_> = self
            .user_point_history
            .iter()
            .map(|(a, h)| (*a, h.clone()))
            .collect();
        user_point_history.sort_by_key(|(a, _)| *a);
        let mut whitelisted: Vec<_> = self.whitelisted.iter().copied().collect();
        whitelisted.sort();

        let state = EscrowState {
            supply: self.supply,
            locks,
            point_history: self.point_history.clone(),
            user_point_history,
            slope_changes: self.slope_changes.iter().map(|(w, d)| (*w, *d)).collect(),
            whitelisted,
        };
        debug!(epoch = self.epoch(), accounts = state.locks.len(), "escrow: snapshot taken");
        state
    }

    /// Rebuild a ledger from a previously captured state.
    pub fn restore(
        config: EscrowConfig,
        state: EscrowState,
        token: Arc<dyn FungibleToken>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EscrowError> {
        config.validate()?;
        state.validate()?;
        let escrow = Self {
            config,
            token,
            clock,
            supply: state.supply,
            locks: state.locks.into_iter().collect::<HashMap<_, _>>(),
            point_history: state.point_history,
            user_point_history: state.user_point_history.into_iter().collect::<HashMap<_, _>>(),
            slope_changes: state.slope_changes.into_iter().collect::<BTreeMap<_, _>>(),
            whitelisted: state.whitelisted.into_iter().collect::<HashSet<_>>(),
        };
        debug!(epoch = escrow.epoch(), supply = escrow.supply, "escrow: restored");
        Ok(escrow)
    }
}
