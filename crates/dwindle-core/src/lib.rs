//! # dwindle-core
//! Foundation types, constants, errors and collaborator traits for Dwindle.
//!
//! The in-memory collaborators ([`clock::ManualClock`], [`token::TokenBank`],
//! [`router::FixedRateRouter`]) back the test suites and simulations; production
//! deployments supply their own implementations of the [`traits`].

pub mod clock;
pub mod constants;
pub mod error;
pub mod router;
pub mod token;
pub mod traits;
pub mod types;
