//! # dwindle-feeder — Staking-pool reward forwarding.
//!
//! A [`RewardFeeder`] stakes a proxy token in an external [`StakingPool`] and
//! pushes whatever the pool pays out into a
//! [`RewardDistributor`](dwindle_distributor::RewardDistributor).
//! [`MemoryStakingPool`] is the in-memory pool used by the test suites.
//!
//! [`StakingPool`]: dwindle_core::traits::StakingPool

pub mod config;
pub mod feeder;
pub mod pool;

pub use config::FeederConfig;
pub use feeder::RewardFeeder;
pub use pool::MemoryStakingPool;
