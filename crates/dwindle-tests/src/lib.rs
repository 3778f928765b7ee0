//! Cross-crate test suite for Dwindle.
//!
//! The integration tests under `tests/` drive the escrow, the distributor,
//! the vault and the feeder together against the in-memory collaborators.
//! Shared fixtures live in [`helpers`].

pub mod helpers;
