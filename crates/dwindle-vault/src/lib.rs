//! # dwindle-vault — Auto-compounding escrow vault.
//!
//! The vault holds a single escrow lock on behalf of all its depositors and
//! tracks their entitlement in shares. Harvested rewards are partly sent to a
//! treasury, swapped into the principal token and added to the shared lock,
//! which raises the principal backing every share.

pub mod config;
pub mod shares;
pub mod vault;

pub use config::VaultConfig;
pub use vault::{CompoundingVault, HarvestReport, HarvestSource, SourceHarvest};
