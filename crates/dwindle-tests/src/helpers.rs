//! Shared fixtures for the integration tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dwindle_core::clock::ManualClock;
use dwindle_core::constants::{DEFAULT_MAX_LOCK_SECS, WEEK};
use dwindle_core::error::TokenError;
use dwindle_core::token::{MemoryToken, TokenBank};
use dwindle_core::traits::FungibleToken;
use dwindle_core::types::{AccountId, BlockInfo, Caller};
use dwindle_distributor::{DistributorConfig, RewardDistributor};
use dwindle_escrow::{EscrowConfig, VotingEscrow};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Week-aligned start time shared by every fixture.
pub const START: u64 = 100 * WEEK;

/// Default maximum lock as an amount. Locking a multiple of it gives an
/// exact integer slope.
pub const MAX: u128 = DEFAULT_MAX_LOCK_SECS as u128;

pub const OPERATOR: AccountId = AccountId::repeat_byte(0xaa);
pub const PRINCIPAL: AccountId = AccountId::repeat_byte(0xd0);
pub const EMERGENCY: AccountId = AccountId::repeat_byte(0xee);

/// Route `tracing` output through the test harness. Honours `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn acct(b: u8) -> AccountId {
    AccountId::repeat_byte(b)
}

pub fn user(b: u8) -> Caller {
    Caller::direct(acct(b))
}

pub fn operator() -> Caller {
    Caller::direct(OPERATOR)
}

/// Escrow configuration owned by [`OPERATOR`].
pub fn escrow_config() -> EscrowConfig {
    EscrowConfig {
        owner: OPERATOR,
        ..Default::default()
    }
}

/// A chain at [`START`] with one principal token and an escrow over it.
pub struct Env {
    pub clock: ManualClock,
    pub bank: TokenBank,
    pub principal: MemoryToken,
    pub escrow: VotingEscrow,
}

impl Env {
    pub fn new() -> Self {
        init_tracing();
        let clock = ManualClock::new(BlockInfo::new(1, START));
        let bank = TokenBank::new();
        let principal = bank.deploy(PRINCIPAL);
        let escrow = VotingEscrow::new(
            escrow_config(),
            Arc::new(principal.clone()),
            Arc::new(clock.clone()),
        )
        .expect("valid escrow config");
        Self {
            clock,
            bank,
            principal,
            escrow,
        }
    }

    /// Mint principal to `account` and approve the escrow for all of it.
    pub fn fund(&self, account: &AccountId, amount: u128) {
        self.principal.mint(account, amount);
        self.principal
            .approve(account, &self.escrow.address(), u128::MAX);
    }

    /// Fund account `b` and lock `amount` until `end`.
    pub fn lock(&mut self, b: u8, amount: u128, end: u64) {
        self.fund(&acct(b), amount);
        self.escrow
            .create_lock(&user(b), amount, end)
            .expect("lock created");
    }

    /// Distributor paying `reward`, starting at [`START`] and owned by [`OPERATOR`].
    pub fn distributor(&self, reward: &MemoryToken, can_checkpoint_token: bool) -> RewardDistributor {
        let config = DistributorConfig {
            owner: OPERATOR,
            start_time: START,
            emergency_return: EMERGENCY,
            can_checkpoint_token,
            ..Default::default()
        };
        RewardDistributor::new(config, Arc::new(reward.clone()), Arc::new(self.clock.clone()))
            .expect("valid distributor config")
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

/// Token wrapper whose transfers can be switched to fail.
///
/// Reads and approvals always go through. While failing, both transfer
/// methods return an error without moving anything; a refused recipient
/// makes only the transfers to that account fail.
#[derive(Clone)]
pub struct FlakyToken {
    inner: MemoryToken,
    failing: Arc<AtomicBool>,
    refused: Arc<Mutex<HashSet<AccountId>>>,
}

impl FlakyToken {
    pub fn new(inner: MemoryToken) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
            refused: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make transfers to `recipient` fail (or succeed again).
    pub fn set_refused(&self, recipient: AccountId, refused: bool) {
        let mut set = self.refused.lock();
        if refused {
            set.insert(recipient);
        } else {
            set.remove(&recipient);
        }
    }

    fn check(&self, to: &AccountId, amount: u128) -> Result<(), TokenError> {
        if self.failing.load(Ordering::SeqCst) || self.refused.lock().contains(to) {
            return Err(TokenError::InsufficientBalance { have: 0, need: amount });
        }
        Ok(())
    }
}

impl FungibleToken for FlakyToken {
    fn address(&self) -> AccountId {
        self.inner.address()
    }

    fn balance_of(&self, account: &AccountId) -> u128 {
        self.inner.balance_of(account)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128 {
        self.inner.allowance(owner, spender)
    }

    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: u128) {
        self.inner.approve(owner, spender, amount);
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), TokenError> {
        self.check(to, amount)?;
        self.inner.transfer(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.check(to, amount)?;
        self.inner.transfer_from(spender, from, to, amount)
    }
}
