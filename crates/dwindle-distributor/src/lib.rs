//! # dwindle-distributor — Week-based reward distribution.
//!
//! Rewards are bucketed into week-aligned epochs. Each account's share of an
//! epoch is its voting power at the epoch's start divided by the total voting
//! power recorded for that week, both read from a
//! [`VotingEscrow`](dwindle_escrow::VotingEscrow). Claims are pull-based and
//! tracked by a per-account week cursor, so a week is never paid twice.

pub mod config;
pub mod distributor;

pub use config::DistributorConfig;
pub use distributor::RewardDistributor;
