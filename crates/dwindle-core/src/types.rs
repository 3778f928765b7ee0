//! Core ledger types: accounts, blocks, decay-curve points and locks.
//!
//! Amounts are `u128` base units. Curve coordinates (`bias`, `slope`) are
//! `i128` so intermediate projections may go negative before clamping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte account address.
///
/// Identifies externally-owned accounts as well as components that hold
/// balances of their own (the escrow custody, a vault, a distributor).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Address with every byte set to `byte`. Handy for fixtures.
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for AccountId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// The chain head as seen by a component: block number and timestamp.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockInfo {
    /// Block height.
    pub number: u64,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
}

impl BlockInfo {
    pub fn new(number: u64, timestamp: u64) -> Self {
        Self { number, timestamp }
    }
}

/// A sample of a piecewise-linear decay curve.
///
/// The curve value at a later time `t` is `max(bias - slope * (t - timestamp), 0)`.
/// Points are append-only history entries and are never mutated once recorded.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Point {
    /// Curve value at `timestamp`.
    pub bias: i128,
    /// Decay per second.
    pub slope: i128,
    /// Recording time (Unix seconds).
    pub timestamp: u64,
    /// Recording block, real or estimated.
    pub block_number: u64,
}

impl Point {
    /// Zero-valued point anchored at `block`.
    pub fn genesis(block: BlockInfo) -> Self {
        Self {
            bias: 0,
            slope: 0,
            timestamp: block.timestamp,
            block_number: block.number,
        }
    }

    /// Evaluate the curve at `timestamp`, clamped to zero.
    ///
    /// Times before the point's own timestamp extrapolate backwards, which is
    /// what the historical block queries rely on when an interpolated time
    /// falls between two per-account points.
    pub fn value_at(&self, timestamp: u64) -> u128 {
        let dt = timestamp as i128 - self.timestamp as i128;
        let value = self.bias.saturating_sub(self.slope.saturating_mul(dt));
        if value > 0 { value as u128 } else { 0 }
    }
}

/// A locked balance. `end == 0` together with `amount == 0` means no lock.
///
/// `end` is always a multiple of [`WEEK`](crate::constants::WEEK).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Lock {
    /// Locked principal in base units.
    pub amount: u128,
    /// Unlock time, rounded down to a week boundary.
    pub end: u64,
}

impl Lock {
    /// Whether a lock with principal exists (expired or not).
    pub fn exists(&self) -> bool {
        self.amount > 0
    }

    /// Whether the lock exists and has passed its unlock time at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.exists() && now >= self.end
    }
}

/// The identity of whoever invokes an operation.
///
/// `sender` is the immediate caller; `origin` is the externally-owned account
/// that started the call chain. For a direct call both are the same account;
/// a contract acting on a user's behalf passes its own address as `sender`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Caller {
    pub sender: AccountId,
    pub origin: AccountId,
}

impl Caller {
    /// A call made directly by an externally-owned account.
    pub fn direct(account: AccountId) -> Self {
        Self {
            sender: account,
            origin: account,
        }
    }

    /// A call made by `contract` on behalf of the transaction started by `origin`.
    pub fn relayed(contract: AccountId, origin: AccountId) -> Self {
        Self {
            sender: contract,
            origin,
        }
    }

    /// Whether the immediate caller is the transaction origin.
    pub fn is_direct(&self) -> bool {
        self.sender == self.origin
    }
}
