//! Reward distributor.
//!
//! Incoming rewards are attributed to weeks by [`checkpoint_token`], which
//! spreads everything received since the previous checkpoint over the elapsed
//! time, or directly by the operator through [`fund_epoch`]. A week becomes
//! claimable once the token checkpoint has moved past its end. Each account
//! is paid `tokens_per_week[w] * balance(w) / supply_snapshot[w]` for every
//! unclaimed week `w`.
//!
//! [`checkpoint_token`]: RewardDistributor::checkpoint_token
//! [`fund_epoch`]: RewardDistributor::fund_epoch

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dwindle_core::constants::{WEEK, ceil_week, floor_week};
use dwindle_core::error::{DistributorError, TokenError};
use dwindle_core::traits::{Clock, FungibleToken};
use dwindle_core::types::{AccountId, Caller};
use dwindle_escrow::VotingEscrow;
use tracing::{debug, info, warn};

use crate::config::DistributorConfig;

/// Week-indexed accounting. Cloned as a savepoint before external calls.
#[derive(Debug, Clone, Default)]
struct Books {
    /// Next week whose total supply has not been snapshotted yet.
    week_cursor: u64,
    last_token_timestamp: u64,
    /// Reward balance already attributed to weeks.
    last_token_balance: u128,
    tokens_per_week: BTreeMap<u64, u128>,
    supply_snapshot: BTreeMap<u64, u128>,
}

/// Result of evaluating one account's unclaimed weeks.
struct Payout {
    amount: u128,
    cursor: u64,
    weeks: u64,
}

/// Pull-based distributor of one reward token.
pub struct RewardDistributor {
    config: DistributorConfig,
    reward_token: Arc<dyn FungibleToken>,
    clock: Arc<dyn Clock>,
    start_week_cursor: u64,
    books: Books,
    user_week_cursor: HashMap<AccountId, u64>,
    can_checkpoint_token: bool,
    killed: bool,
}

impl RewardDistributor {
    pub fn new(
        config: DistributorConfig,
        reward_token: Arc<dyn FungibleToken>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DistributorError> {
        config.validate()?;
        let start_week_cursor = floor_week(config.start_time);
        info!(
            address = %config.address,
            start = start_week_cursor,
            token = %reward_token.address(),
            "distributor: deployed"
        );
        Ok(Self {
            can_checkpoint_token: config.can_checkpoint_token,
            books: Books {
                week_cursor: start_week_cursor,
                last_token_timestamp: config.start_time,
                ..Default::default()
            },
            config,
            reward_token,
            clock,
            start_week_cursor,
            user_week_cursor: HashMap::new(),
            killed: false,
        })
    }

    fn only_owner(&self, caller: &Caller, action: &str) -> Result<(), DistributorError> {
        if caller.sender != self.config.owner {
            warn!(sender = %caller.sender, action, "distributor: rejected operator call");
            return Err(DistributorError::Unauthorized(format!(
                "{} may not {action}",
                caller.sender
            )));
        }
        Ok(())
    }

    fn only_live(&self) -> Result<(), DistributorError> {
        if self.killed {
            return Err(DistributorError::Killed);
        }
        Ok(())
    }

    fn token_checkpoint_due(&self, now: u64) -> bool {
        self.can_checkpoint_token
            && now > self
                .books
                .last_token_timestamp
                .saturating_add(self.config.token_checkpoint_deadline_secs)
    }

    // ------------------------------------------------------------------
    // Funding
    // ------------------------------------------------------------------

    /// Attribute rewards received since the last checkpoint to the weeks
    /// that elapsed in between.
    ///
    /// The operator may always call this; anyone else only when permissionless
    /// checkpoints are enabled and the deadline has passed.
    pub fn checkpoint_token(&mut self, caller: &Caller) -> Result<(), DistributorError> {
        self.only_live()?;
        let now = self.clock.now().timestamp;
        if caller.sender != self.config.owner && !self.token_checkpoint_due(now) {
            return Err(DistributorError::Unauthorized(format!(
                "{} may not checkpoint tokens yet",
                caller.sender
            )));
        }
        self.apply_token_checkpoint(now)
    }

    fn apply_token_checkpoint(&mut self, now: u64) -> Result<(), DistributorError> {
        let balance = self.reward_token.balance_of(&self.config.address);
        let to_distribute = balance.saturating_sub(self.books.last_token_balance);
        self.books.last_token_balance = balance;

        let mut t = self.books.last_token_timestamp;
        let since_last = now.saturating_sub(t);
        self.books.last_token_timestamp = now;
        let mut this_week = floor_week(t);

        loop {
            let next_week = this_week + WEEK;
            let (segment_end, last) = if now < next_week {
                (now, true)
            } else {
                (next_week, false)
            };
            let share = if since_last == 0 {
                if segment_end == t { to_distribute } else { 0 }
            } else {
                to_distribute
                    .checked_mul((segment_end - t) as u128)
                    .ok_or(DistributorError::ArithmeticOverflow)?
                    / since_last as u128
            };
            if share > 0 {
                *self.books.tokens_per_week.entry(this_week).or_insert(0) += share;
            }
            if last {
                break;
            }
            t = next_week;
            this_week = next_week;
        }

        debug!(to_distribute, timestamp = now, "distributor: token checkpoint");
        Ok(())
    }

    /// Add `amount` to the reward of `week`, pulled from the operator.
    ///
    /// `week` must be week-aligned and not before the current week.
    pub fn fund_epoch(&mut self, caller: &Caller, week: u64, amount: u128) -> Result<(), DistributorError> {
        self.only_live()?;
        self.only_owner(caller, "fund epochs")?;
        let now = self.clock.now().timestamp;
        if week % WEEK != 0 || week < floor_week(now) {
            return Err(DistributorError::InvalidEpoch(week));
        }
        if amount == 0 {
            return Err(DistributorError::InvalidAmount);
        }

        let savepoint = self.books.clone();
        let slot = self.books.tokens_per_week.entry(week).or_insert(0);
        *slot = slot.checked_add(amount).ok_or(DistributorError::ArithmeticOverflow)?;
        self.books.last_token_balance = self
            .books
            .last_token_balance
            .checked_add(amount)
            .ok_or(DistributorError::ArithmeticOverflow)?;

        let address = self.config.address;
        if let Err(e) = self.reward_token.transfer_from(&address, &caller.sender, &address, amount) {
            self.books = savepoint;
            return Err(e.into());
        }
        info!(week, amount, "distributor: epoch funded");
        Ok(())
    }

    /// Pull `amount` from `caller.sender` into the distributor.
    ///
    /// Attributes it immediately when a permissionless token checkpoint is due.
    pub fn feed(&mut self, caller: &Caller, amount: u128) -> Result<(), DistributorError> {
        self.only_live()?;
        if amount == 0 {
            return Err(DistributorError::InvalidAmount);
        }
        let address = self.config.address;
        self.reward_token
            .transfer_from(&address, &caller.sender, &address, amount)?;

        let now = self.clock.now().timestamp;
        if self.token_checkpoint_due(now) {
            self.apply_token_checkpoint(now)?;
        }
        info!(from = %caller.sender, amount, "distributor: fed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Supply snapshots
    // ------------------------------------------------------------------

    /// Record the escrow's total supply for every week boundary not yet
    /// snapshotted and strictly before now.
    ///
    /// A boundary equal to the current timestamp is left for a later call,
    /// since locks created in this same second still count towards it.
    pub fn checkpoint_total_supply(&mut self, escrow: &VotingEscrow) {
        let now = self.clock.now().timestamp;
        let mut week = self.books.week_cursor;
        let mut recorded = 0u64;
        while week < now {
            self.books
                .supply_snapshot
                .insert(week, escrow.total_supply_at_time(week));
            week += WEEK;
            recorded += 1;
        }
        self.books.week_cursor = week;
        if recorded > 0 {
            debug!(weeks = recorded, cursor = week, "distributor: supply checkpoint");
        }
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    fn payout(
        &self,
        escrow: &VotingEscrow,
        account: &AccountId,
        supply_at: impl Fn(u64) -> u128,
    ) -> Result<Option<Payout>, DistributorError> {
        if escrow.user_point_epoch(account) == 0 {
            return Ok(None);
        }
        let mut week = match self.user_week_cursor.get(account) {
            Some(cursor) => *cursor,
            None => {
                let first = escrow
                    .user_point_history(account, 1)
                    .map_or(0, |p| p.timestamp);
                ceil_week(first).max(self.start_week_cursor)
            }
        };

        let last_week = floor_week(self.books.last_token_timestamp);
        let mut amount = 0u128;
        let mut weeks = 0u64;
        while week < last_week {
            let supply = supply_at(week);
            let tokens = self.books.tokens_per_week.get(&week).copied().unwrap_or(0);
            if supply > 0 && tokens > 0 {
                let balance = escrow.balance_of_at_time(account, week);
                let share = tokens
                    .checked_mul(balance)
                    .ok_or(DistributorError::ArithmeticOverflow)?
                    / supply;
                amount = amount
                    .checked_add(share)
                    .ok_or(DistributorError::ArithmeticOverflow)?;
            }
            week += WEEK;
            weeks += 1;
        }
        Ok(Some(Payout {
            amount,
            cursor: week,
            weeks,
        }))
    }

    /// Bring snapshots and (when due) the token checkpoint up to date before
    /// evaluating claims.
    fn prepare_claims(&mut self, escrow: &VotingEscrow) -> Result<(), DistributorError> {
        let now = self.clock.now().timestamp;
        if now >= self.books.week_cursor {
            self.checkpoint_total_supply(escrow);
        }
        if self.token_checkpoint_due(now) {
            self.apply_token_checkpoint(now)?;
        }
        Ok(())
    }

    /// Pay `account` everything owed for closed weeks. Anyone may trigger it;
    /// the payout always goes to `account`.
    pub fn claim(&mut self, escrow: &VotingEscrow, account: &AccountId) -> Result<u128, DistributorError> {
        self.claim_many(escrow, std::slice::from_ref(account))
    }

    /// Claim for several accounts at once and return the total paid.
    ///
    /// The distributor's balance is checked against the total owed before any
    /// payment is made. Payments then go out in order, and an account's week
    /// cursor only moves once its transfer went through. If a transfer fails,
    /// the accounts paid before it stay settled while the failing account and
    /// those after it keep their cursors; when nothing was paid the call
    /// leaves no trace at all.
    pub fn claim_many(&mut self, escrow: &VotingEscrow, accounts: &[AccountId]) -> Result<u128, DistributorError> {
        self.only_live()?;
        let savepoint = self.books.clone();
        let payouts = match self.evaluate_claims(escrow, accounts) {
            Ok(payouts) => payouts,
            Err(e) => {
                self.books = savepoint;
                return Err(e);
            }
        };

        let address = self.config.address;
        let mut paid = 0u128;
        let mut settled_empty = Vec::new();
        for (account, payout) in payouts {
            if payout.amount == 0 {
                settled_empty.push((account, payout.cursor));
                continue;
            }
            if let Err(e) = self.reward_token.transfer(&address, &account, payout.amount) {
                if paid == 0 {
                    self.books = savepoint;
                }
                warn!(%account, amount = payout.amount, paid, error = %e, "distributor: payout failed");
                return Err(e.into());
            }
            self.books.last_token_balance = self.books.last_token_balance.saturating_sub(payout.amount);
            self.user_week_cursor.insert(account, payout.cursor);
            paid += payout.amount;
            info!(%account, amount = payout.amount, weeks = payout.weeks, "distributor: claimed");
        }
        self.user_week_cursor.extend(settled_empty);
        Ok(paid)
    }

    /// Catch up the books and work out what each distinct account is owed.
    fn evaluate_claims(
        &mut self,
        escrow: &VotingEscrow,
        accounts: &[AccountId],
    ) -> Result<Vec<(AccountId, Payout)>, DistributorError> {
        self.prepare_claims(escrow)?;

        let mut seen = HashSet::with_capacity(accounts.len());
        let mut payouts = Vec::with_capacity(accounts.len());
        let mut total = 0u128;
        for account in accounts {
            if !seen.insert(*account) {
                continue;
            }
            let snapshots = &self.books.supply_snapshot;
            let Some(payout) =
                self.payout(escrow, account, |w| snapshots.get(&w).copied().unwrap_or(0))?
            else {
                continue;
            };
            total = total
                .checked_add(payout.amount)
                .ok_or(DistributorError::ArithmeticOverflow)?;
            payouts.push((*account, payout));
        }

        let available = self.reward_token.balance_of(&self.config.address);
        if available < total {
            return Err(TokenError::InsufficientBalance { have: available, need: total }.into());
        }
        Ok(payouts)
    }

    /// What [`claim`](Self::claim) would pay `account` right now, without
    /// changing any state.
    ///
    /// Weeks whose supply snapshot is still missing are evaluated the way the
    /// next snapshot would record them.
    pub fn claimable(&self, escrow: &VotingEscrow, account: &AccountId) -> Result<u128, DistributorError> {
        if self.killed {
            return Ok(0);
        }
        let now = self.clock.now().timestamp;
        let payout = self.payout(escrow, account, |w| {
            match self.books.supply_snapshot.get(&w) {
                Some(supply) => *supply,
                None if w < now => escrow.total_supply_at_time(w),
                None => 0,
            }
        })?;
        Ok(payout.map_or(0, |p| p.amount))
    }

    // ------------------------------------------------------------------
    // Operator controls
    // ------------------------------------------------------------------

    pub fn set_can_checkpoint_token(&mut self, caller: &Caller, allowed: bool) -> Result<(), DistributorError> {
        self.only_owner(caller, "toggle token checkpoints")?;
        self.can_checkpoint_token = allowed;
        info!(allowed, "distributor: permissionless token checkpoint toggled");
        Ok(())
    }

    /// Stop the distributor for good and sweep its balance to the emergency
    /// return address.
    pub fn kill(&mut self, caller: &Caller) -> Result<u128, DistributorError> {
        self.only_live()?;
        self.only_owner(caller, "kill")?;
        let address = self.config.address;
        let balance = self.reward_token.balance_of(&address);

        self.killed = true;
        let last_token_balance = self.books.last_token_balance;
        self.books.last_token_balance = 0;
        if let Err(e) = self
            .reward_token
            .transfer(&address, &self.config.emergency_return, balance)
        {
            self.killed = false;
            self.books.last_token_balance = last_token_balance;
            return Err(e.into());
        }
        warn!(swept = balance, to = %self.config.emergency_return, "distributor: killed");
        Ok(balance)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn address(&self) -> AccountId {
        self.config.address
    }

    pub fn reward_token(&self) -> AccountId {
        self.reward_token.address()
    }

    pub fn start_week_cursor(&self) -> u64 {
        self.start_week_cursor
    }

    /// Next week whose supply snapshot is still pending.
    pub fn week_cursor(&self) -> u64 {
        self.books.week_cursor
    }

    /// First week `account` has not been paid for yet, once it has claimed.
    pub fn user_week_cursor(&self, account: &AccountId) -> Option<u64> {
        self.user_week_cursor.get(account).copied()
    }

    pub fn last_token_timestamp(&self) -> u64 {
        self.books.last_token_timestamp
    }

    pub fn last_token_balance(&self) -> u128 {
        self.books.last_token_balance
    }

    pub fn tokens_per_week(&self, week: u64) -> u128 {
        self.books.tokens_per_week.get(&week).copied().unwrap_or(0)
    }

    pub fn supply_snapshot(&self, week: u64) -> Option<u128> {
        self.books.supply_snapshot.get(&week).copied()
    }

    pub fn can_checkpoint_token(&self) -> bool {
        self.can_checkpoint_token
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }
}
