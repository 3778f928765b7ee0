//! The compounding vault.
//!
//! The vault acts on the escrow as a whitelisted contract: every escrow call
//! is made with [`Caller::relayed`] from the vault's own address, and the
//! escrow pulls principal out of the vault's balance. Principal the vault
//! holds outside the lock (reinvested after expiry, or pulled out for
//! withdrawals) is tracked as idle principal and backs shares just like the
//! locked amount does.
//!
//! A harvest that fails after claiming keeps what it already gained: converted
//! principal is held idle, and claimed rewards that were not converted yet
//! are carried into the next harvest of the same reward token.

use std::collections::HashMap;
use std::sync::Arc;

use dwindle_core::error::{EscrowError, RouterError, VaultError};
use dwindle_core::traits::{Clock, FungibleToken, SwapRouter};
use dwindle_core::types::{AccountId, Caller, Lock};
use dwindle_distributor::RewardDistributor;
use dwindle_escrow::VotingEscrow;
use tracing::{info, warn};

use crate::config::VaultConfig;
use crate::shares::{ShareLedger, amount_for_shares, shares_for_deposit, split_fee};

/// One reward stream to harvest.
pub struct HarvestSource<'a> {
    pub distributor: &'a mut RewardDistributor,
    /// Handle on the distributor's reward token.
    pub reward_token: Arc<dyn FungibleToken>,
    /// Swap route from the reward token to the principal. Ignored when the
    /// reward already is the principal.
    pub swap_path: Vec<AccountId>,
    /// Minimum principal the swap must return.
    pub min_out: u128,
}

/// What one [`HarvestSource`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHarvest {
    pub reward_token: AccountId,
    pub claimed: u128,
    pub fee: u128,
    pub principal_out: u128,
}

/// Outcome of [`CompoundingVault::harvest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub sources: Vec<SourceHarvest>,
    /// Principal added to the shared lock.
    pub reinvested: u128,
    /// Principal kept idle because the lock had expired.
    pub idle: u128,
}

/// Claimed reward still held in the reward token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Unconverted {
    /// Not yet charged the treasury fee.
    gross: u128,
    /// Fee paid, waiting for the swap.
    net: u128,
}

/// Vault pooling depositors behind one escrow lock.
pub struct CompoundingVault {
    config: VaultConfig,
    principal: Arc<dyn FungibleToken>,
    router: Arc<dyn SwapRouter>,
    clock: Arc<dyn Clock>,
    shares: ShareLedger,
    idle_principal: u128,
    unconverted: HashMap<AccountId, Unconverted>,
}

impl CompoundingVault {
    pub fn new(
        config: VaultConfig,
        principal: Arc<dyn FungibleToken>,
        router: Arc<dyn SwapRouter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        info!(
            address = %config.address,
            fee_bps = config.treasury_fee_bps,
            "vault: deployed"
        );
        Ok(Self {
            config,
            principal,
            router,
            clock,
            shares: ShareLedger::default(),
            idle_principal: 0,
            unconverted: HashMap::new(),
        })
    }

    fn only_owner(&self, caller: &Caller, action: &str) -> Result<(), VaultError> {
        if caller.sender != self.config.owner {
            warn!(sender = %caller.sender, action, "vault: rejected operator call");
            return Err(VaultError::Unauthorized(format!(
                "{} may not {action}",
                caller.sender
            )));
        }
        Ok(())
    }

    fn as_caller(&self, origin: AccountId) -> Caller {
        Caller::relayed(self.config.address, origin)
    }

    fn unlock_time(&self) -> u64 {
        self.clock
            .now()
            .timestamp
            .saturating_add(self.config.lock_duration_secs)
    }

    /// Put `amount` of the vault's own principal into the escrow, creating
    /// the lock when there is none.
    fn lock_principal(&self, escrow: &mut VotingEscrow, origin: AccountId, amount: u128) -> Result<(), EscrowError> {
        let address = self.config.address;
        self.principal.approve(&address, &escrow.address(), amount);
        let caller = self.as_caller(origin);
        let result = if escrow.locks(&address).exists() {
            escrow.increase_lock_amount(&caller, amount)
        } else {
            escrow.create_lock(&caller, amount, self.unlock_time())
        };
        self.principal.approve(&address, &escrow.address(), 0);
        result
    }

    /// Reject deposits the shared lock cannot take.
    fn check_accepting(&self, lock: Lock, now: u64) -> Result<(), VaultError> {
        if !lock.exists() && self.shares.total() > 0 {
            return Err(VaultError::Unlocked);
        }
        if lock.is_expired(now) {
            return Err(EscrowError::LockExpired { end: lock.end, now }.into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lock management
    // ------------------------------------------------------------------

    /// Seed the shared lock with `amount` from the operator, who receives
    /// shares for it.
    pub fn create_lock(&mut self, caller: &Caller, escrow: &mut VotingEscrow, amount: u128) -> Result<u128, VaultError> {
        self.only_owner(caller, "create the lock")?;
        let lock = escrow.locks(&self.config.address);
        if lock.exists() {
            return Err(EscrowError::LockAlreadyExists.into());
        }
        if self.shares.total() > 0 {
            return Err(VaultError::Unlocked);
        }
        let shares = self.enter(caller, escrow, amount)?;
        info!(amount, end = escrow.locks(&self.config.address).end, "vault: lock created");
        Ok(shares)
    }

    /// Deposit `amount` of principal and receive shares.
    ///
    /// The first deposit creates the shared lock; later ones top it up. When
    /// the escrow rejects the principal it is refunded; if even the refund
    /// fails, the shares stand and the principal is held idle behind them.
    pub fn deposit(&mut self, caller: &Caller, escrow: &mut VotingEscrow, amount: u128) -> Result<u128, VaultError> {
        let now = self.clock.now().timestamp;
        self.check_accepting(escrow.locks(&self.config.address), now)?;
        let shares = self.enter(caller, escrow, amount)?;
        info!(account = %caller.sender, amount, shares, "vault: deposit");
        Ok(shares)
    }

    fn enter(&mut self, caller: &Caller, escrow: &mut VotingEscrow, amount: u128) -> Result<u128, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let depositor = caller.sender;
        let total_principal = self.total_principal(escrow);
        let shares = shares_for_deposit(amount, self.shares.total(), total_principal)?;
        if shares == 0 {
            return Err(VaultError::InvalidAmount);
        }

        self.shares.mint(&depositor, shares)?;

        let address = self.config.address;
        if let Err(e) = self.principal.transfer_from(&address, &depositor, &address, amount) {
            self.shares.burn(&depositor, shares)?;
            return Err(e.into());
        }
        if let Err(e) = self.lock_principal(escrow, caller.origin, amount) {
            if let Err(refund) = self.principal.transfer(&address, &depositor, amount) {
                self.hold_idle(amount);
                warn!(%depositor, amount, error = %e, %refund, "vault: refund failed, deposit held idle");
                return Ok(shares);
            }
            self.shares.burn(&depositor, shares)?;
            return Err(e.into());
        }
        Ok(shares)
    }

    /// Push the shared lock's end out to `now + lock_duration`.
    pub fn extend_lock(&mut self, caller: &Caller, escrow: &mut VotingEscrow) -> Result<(), VaultError> {
        self.only_owner(caller, "extend the lock")?;
        let unlock_time = self.unlock_time();
        escrow.increase_lock_duration(&self.as_caller(caller.origin), unlock_time)?;
        info!(end = escrow.locks(&self.config.address).end, "vault: lock extended");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Harvest
    // ------------------------------------------------------------------

    /// Check that `source` would convert without tripping its `min_out`.
    fn quote(&self, escrow: &VotingEscrow, source: &HarvestSource<'_>) -> Result<(), VaultError> {
        let carried = self
            .unconverted
            .get(&source.reward_token.address())
            .copied()
            .unwrap_or_default();
        let claimable = source.distributor.claimable(escrow, &self.config.address)?;
        let gross = claimable
            .checked_add(carried.gross)
            .ok_or(VaultError::ArithmeticOverflow)?;
        let (_, taxed) = split_fee(gross, self.config.treasury_fee_bps)?;
        let swap_in = taxed
            .checked_add(carried.net)
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.swap_quote(source, swap_in)?;
        Ok(())
    }

    fn swap_quote(&self, source: &HarvestSource<'_>, amount_in: u128) -> Result<u128, VaultError> {
        let reward = source.reward_token.address();
        if reward == self.principal.address() || amount_in == 0 {
            return Ok(amount_in);
        }
        let path = &source.swap_path;
        if path.len() < 2 || path[0] != reward || path[path.len() - 1] != self.principal.address() {
            return Err(RouterError::InvalidPath(path.len()).into());
        }
        let out = self.router.get_amount_out(path, amount_in)?;
        if out < source.min_out {
            return Err(RouterError::SlippageExceeded {
                got: out,
                min_out: source.min_out,
            }
            .into());
        }
        Ok(out)
    }

    /// Claim every source, pay the treasury fee, swap the rest into
    /// principal and add it to the shared lock. Operator only.
    ///
    /// All swap quotes are checked before anything is claimed, so a source
    /// that would miss its `min_out` aborts the whole harvest untouched.
    /// Killed distributors are not claimed from. If a later step fails, the
    /// principal gained so far is held idle and unconverted rewards are
    /// retried by the next harvest.
    pub fn harvest(
        &mut self,
        caller: &Caller,
        escrow: &mut VotingEscrow,
        sources: &mut [HarvestSource<'_>],
    ) -> Result<HarvestReport, VaultError> {
        self.only_owner(caller, "harvest")?;
        for source in sources.iter() {
            self.quote(&*escrow, source)?;
        }

        let mut report = HarvestReport::default();
        let mut principal_gained = 0u128;
        if let Err(e) = self.convert_sources(&*escrow, sources, &mut report, &mut principal_gained) {
            self.hold_idle(principal_gained);
            warn!(held = principal_gained, error = %e, "vault: harvest interrupted");
            return Err(e);
        }

        if principal_gained > 0 {
            let now = self.clock.now().timestamp;
            let lock = escrow.locks(&self.config.address);
            if lock.exists() && !lock.is_expired(now) {
                if let Err(e) = self.lock_principal(escrow, caller.origin, principal_gained) {
                    self.hold_idle(principal_gained);
                    warn!(held = principal_gained, error = %e, "vault: reinvest rejected");
                    return Err(e.into());
                }
                report.reinvested = principal_gained;
            } else {
                self.hold_idle(principal_gained);
                report.idle = principal_gained;
            }
        }
        info!(
            sources = report.sources.len(),
            reinvested = report.reinvested,
            idle = report.idle,
            "vault: harvested"
        );
        Ok(report)
    }

    /// Claim and convert each source in turn, adding converted principal to
    /// `gained` as it arrives.
    fn convert_sources(
        &mut self,
        escrow: &VotingEscrow,
        sources: &mut [HarvestSource<'_>],
        report: &mut HarvestReport,
        gained: &mut u128,
    ) -> Result<(), VaultError> {
        let address = self.config.address;
        for source in sources.iter_mut() {
            let reward_token = source.reward_token.address();
            let claimed = if source.distributor.is_killed() {
                0
            } else {
                source.distributor.claim(escrow, &address)?
            };
            let carried = self.unconverted.remove(&reward_token).unwrap_or_default();
            let pending = Unconverted {
                gross: carried.gross.saturating_add(claimed),
                net: carried.net,
            };
            if pending == Unconverted::default() {
                continue;
            }
            match self.convert(source, pending) {
                Ok((fee, out)) => {
                    *gained = gained.saturating_add(out);
                    report.sources.push(SourceHarvest {
                        reward_token,
                        claimed,
                        fee,
                        principal_out: out,
                    });
                }
                Err((left, e)) => {
                    if left != Unconverted::default() {
                        self.unconverted.insert(reward_token, left);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Charge the fee on `pending` and swap the remainder into principal.
    ///
    /// Returns the fee and the principal received, or the part of `pending`
    /// still held in the reward token together with the error.
    fn convert(
        &self,
        source: &HarvestSource<'_>,
        pending: Unconverted,
    ) -> Result<(u128, u128), (Unconverted, VaultError)> {
        let address = self.config.address;
        let (fee, taxed) =
            split_fee(pending.gross, self.config.treasury_fee_bps).map_err(|e| (pending, e))?;
        if fee > 0 {
            source
                .reward_token
                .transfer(&address, &self.config.treasury, fee)
                .map_err(|e| (pending, VaultError::from(e)))?;
        }
        let swap_in = taxed.saturating_add(pending.net);
        if swap_in == 0 || source.reward_token.address() == self.principal.address() {
            return Ok((fee, swap_in));
        }

        let router = self.router.address();
        source.reward_token.approve(&address, &router, swap_in);
        let swapped = self.router.swap_exact_tokens_for_tokens(
            &address,
            &source.swap_path,
            swap_in,
            source.min_out,
            self.clock.now().timestamp,
            &address,
        );
        source.reward_token.approve(&address, &router, 0);
        let out = swapped.map_err(|e| (Unconverted { gross: 0, net: swap_in }, VaultError::from(e)))?;
        Ok((fee, out))
    }

    fn hold_idle(&mut self, amount: u128) {
        self.idle_principal = self.idle_principal.saturating_add(amount);
    }

    // ------------------------------------------------------------------
    // Withdraw
    // ------------------------------------------------------------------

    /// Redeem `shares` for principal once the shared lock has expired.
    ///
    /// The first withdrawal after expiry pulls the whole principal out of the
    /// escrow into the vault.
    pub fn withdraw(&mut self, caller: &Caller, escrow: &mut VotingEscrow, shares: u128) -> Result<u128, VaultError> {
        if shares == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let account = caller.sender;
        let have = self.shares.balance_of(&account);
        if have < shares {
            return Err(VaultError::InsufficientShares { have, need: shares });
        }

        let address = self.config.address;
        let now = self.clock.now().timestamp;
        let lock = escrow.locks(&address);
        if lock.exists() {
            if now < lock.end {
                return Err(VaultError::LockNotExpired { end: lock.end, now });
            }
            let released = escrow.withdraw(&self.as_caller(caller.origin))?;
            self.idle_principal = self
                .idle_principal
                .checked_add(released)
                .ok_or(VaultError::ArithmeticOverflow)?;
            info!(released, "vault: lock withdrawn");
        }

        let amount = amount_for_shares(shares, self.shares.total(), self.idle_principal)?;
        self.shares.burn(&account, shares)?;
        self.idle_principal -= amount;
        if let Err(e) = self.principal.transfer(&address, &account, amount) {
            self.idle_principal += amount;
            self.shares.mint(&account, shares)?;
            return Err(e.into());
        }
        info!(%account, shares, amount, "vault: withdraw");
        Ok(amount)
    }

    // ------------------------------------------------------------------
    // Operator settings and queries
    // ------------------------------------------------------------------

    pub fn set_treasury(&mut self, caller: &Caller, treasury: AccountId, fee_bps: u128) -> Result<(), VaultError> {
        self.only_owner(caller, "set the treasury")?;
        let updated = VaultConfig {
            treasury,
            treasury_fee_bps: fee_bps,
            ..self.config.clone()
        };
        updated.validate()?;
        self.config = updated;
        info!(%treasury, fee_bps, "vault: treasury updated");
        Ok(())
    }

    pub fn address(&self) -> AccountId {
        self.config.address
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Shares held by `account`.
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        self.shares.balance_of(account)
    }

    pub fn total_shares(&self) -> u128 {
        self.shares.total()
    }

    pub fn idle_principal(&self) -> u128 {
        self.idle_principal
    }

    /// Claimed `reward_token` the vault still holds from an interrupted harvest.
    pub fn unconverted_reward(&self, reward_token: &AccountId) -> u128 {
        self.unconverted
            .get(reward_token)
            .map_or(0, |u| u.gross.saturating_add(u.net))
    }

    /// Locked plus idle principal backing all shares.
    pub fn total_principal(&self, escrow: &VotingEscrow) -> u128 {
        escrow
            .locks(&self.config.address)
            .amount
            .saturating_add(self.idle_principal)
    }

    /// Principal currently backing `account`'s shares.
    pub fn principal_of(&self, escrow: &VotingEscrow, account: &AccountId) -> Result<u128, VaultError> {
        amount_for_shares(
            self.shares.balance_of(account),
            self.shares.total(),
            self.total_principal(escrow),
        )
    }
}
