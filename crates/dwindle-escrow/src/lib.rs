//! # dwindle-escrow — Time-decaying voting-escrow ledger.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! - **Locks**: an account locks principal until a week-aligned unlock time of
//!   at most `max_lock` seconds ahead. Its voting power starts at
//!   `amount * remaining / max_lock` and decays linearly to zero at `end`.
//! - **Curve history**: every mutation appends a [`Point`](dwindle_core::types::Point)
//!   to the account's history and to the global history, so balances and total
//!   supply can be answered for any past block or timestamp.
//! - **Slope changes**: the global decay rate drops at each lock's `end`; the
//!   scheduled deltas live in a week-keyed table that the [`scheduler`] replays
//!   whenever the global history is brought forward.

pub mod config;
pub mod curve;
pub mod escrow;
pub mod scheduler;
pub mod snapshot;

pub use config::EscrowConfig;
pub use escrow::VotingEscrow;
pub use snapshot::EscrowState;
