//! The voting-escrow ledger.
//!
//! [`VotingEscrow`] keeps one [`Lock`] per account, the global and
//! per-account curve histories, and the week-keyed slope-change table.
//! Every account mutation brings the global history forward through the
//! [`scheduler`](crate::scheduler), records the account's new curve, then
//! moves principal through the token collaborator. If that transfer fails
//! the ledger is restored from a savepoint taken before the first write.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dwindle_core::constants::floor_week;
use dwindle_core::error::EscrowError;
use dwindle_core::traits::{Clock, FungibleToken};
use dwindle_core::types::{AccountId, BlockInfo, Caller, Lock, Point};
use tracing::{debug, info, warn};

use crate::config::EscrowConfig;
use crate::curve::{find_block_epoch, find_timestamp_epoch, interpolate_block_time, lock_curve, supply_at};
use crate::scheduler::advance;

/// Principal movement that closes an account mutation.
enum Settlement {
    /// Pull `amount` from `payer` into custody.
    Deposit { payer: AccountId, amount: u128 },
    /// Pay `amount` out of custody to `payee`.
    Payout { payee: AccountId, amount: u128 },
    /// No principal moves.
    Nothing,
}

/// Everything an account mutation may touch, captured before the first write.
struct Savepoint {
    account: AccountId,
    supply: u128,
    lock: Option<Lock>,
    global_len: usize,
    user_len: Option<usize>,
    slope_changes: Vec<(u64, Option<i128>)>,
}

/// Time-decaying voting-escrow ledger.
pub struct VotingEscrow {
    pub(crate) config: EscrowConfig,
    pub(crate) token: Arc<dyn FungibleToken>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) supply: u128,
    pub(crate) locks: HashMap<AccountId, Lock>,
    /// Global history. Index 0 is the genesis point.
    pub(crate) point_history: Vec<Point>,
    /// Per-account histories; epoch `e` lives at index `e - 1`.
    pub(crate) user_point_history: HashMap<AccountId, Vec<Point>>,
    pub(crate) slope_changes: BTreeMap<u64, i128>,
    pub(crate) whitelisted: HashSet<AccountId>,
}

impl VotingEscrow {
    /// Deploy an empty ledger at the current block.
    pub fn new(
        config: EscrowConfig,
        token: Arc<dyn FungibleToken>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EscrowError> {
        config.validate()?;
        let genesis = Point::genesis(clock.now());
        info!(
            custody = %config.address,
            max_lock = config.max_lock_secs,
            timestamp = genesis.timestamp,
            "escrow: deployed"
        );
        Ok(Self {
            config,
            token,
            clock,
            supply: 0,
            locks: HashMap::new(),
            point_history: vec![genesis],
            user_point_history: HashMap::new(),
            slope_changes: BTreeMap::new(),
            whitelisted: HashSet::new(),
        })
    }

    // ------------------------------------------------------------------
    // Access control
    // ------------------------------------------------------------------

    /// Allow or revoke a contract caller. Owner only.
    pub fn set_whitelisted_caller(
        &mut self,
        caller: &Caller,
        account: AccountId,
        allowed: bool,
    ) -> Result<(), EscrowError> {
        if caller.sender != self.config.owner {
            warn!(sender = %caller.sender, "escrow: rejected whitelist change");
            return Err(EscrowError::Unauthorized(format!(
                "{} is not the owner",
                caller.sender
            )));
        }
        if allowed {
            self.whitelisted.insert(account);
        } else {
            self.whitelisted.remove(&account);
        }
        info!(%account, allowed, "escrow: whitelist updated");
        Ok(())
    }

    pub fn is_whitelisted(&self, account: &AccountId) -> bool {
        self.whitelisted.contains(account)
    }

    fn authorize(&self, caller: &Caller) -> Result<(), EscrowError> {
        if caller.is_direct() || self.whitelisted.contains(&caller.sender) {
            Ok(())
        } else {
            Err(EscrowError::Unauthorized(format!(
                "contract {} is not whitelisted",
                caller.sender
            )))
        }
    }

    // ------------------------------------------------------------------
    // Lock lifecycle
    // ------------------------------------------------------------------

    /// Lock `amount` for `caller.sender` until `unlock_time`, rounded down to
    /// a week boundary.
    ///
    /// An `amount` below `max_lock` base units is accepted but gets a zero
    /// slope, so it never has voting power.
    pub fn create_lock(
        &mut self,
        caller: &Caller,
        amount: u128,
        unlock_time: u64,
    ) -> Result<(), EscrowError> {
        self.authorize(caller)?;
        let account = caller.sender;
        let now = self.clock.now();
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let old = self.locks(&account);
        if old.exists() {
            return Err(EscrowError::LockAlreadyExists);
        }
        let end = floor_week(unlock_time);
        self.check_unlock_time(end, now.timestamp)?;

        let new = Lock { amount, end };
        self.commit(account, old, new, now, Settlement::Deposit { payer: account, amount })?;
        info!(%account, amount, end, "escrow: lock created");
        Ok(())
    }

    /// Add `amount` to `account`'s active lock, paid by `caller.sender`.
    ///
    /// The unlock time is unchanged.
    pub fn deposit_for(
        &mut self,
        caller: &Caller,
        account: AccountId,
        amount: u128,
    ) -> Result<(), EscrowError> {
        self.authorize(caller)?;
        let now = self.clock.now();
        let old = self.active_lock(&account, now.timestamp)?;
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let new = Lock {
            amount: old.amount.checked_add(amount).ok_or(EscrowError::ArithmeticOverflow)?,
            end: old.end,
        };
        let payer = caller.sender;
        self.commit(account, old, new, now, Settlement::Deposit { payer, amount })?;
        info!(%account, %payer, amount, total = new.amount, "escrow: deposit for");
        Ok(())
    }

    /// Add `amount` to the caller's own active lock.
    pub fn increase_lock_amount(&mut self, caller: &Caller, amount: u128) -> Result<(), EscrowError> {
        self.authorize(caller)?;
        let account = caller.sender;
        let now = self.clock.now();
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let old = self.active_lock(&account, now.timestamp)?;
        let new = Lock {
            amount: old.amount.checked_add(amount).ok_or(EscrowError::ArithmeticOverflow)?,
            end: old.end,
        };
        self.commit(account, old, new, now, Settlement::Deposit { payer: account, amount })?;
        info!(%account, amount, total = new.amount, "escrow: lock amount increased");
        Ok(())
    }

    /// Push the caller's unlock time out to `unlock_time`, rounded down to a
    /// week boundary. The new end must be strictly later than the current one.
    pub fn increase_lock_duration(&mut self, caller: &Caller, unlock_time: u64) -> Result<(), EscrowError> {
        self.authorize(caller)?;
        let account = caller.sender;
        let now = self.clock.now();
        let old = self.active_lock(&account, now.timestamp)?;
        let end = floor_week(unlock_time);
        if end <= old.end {
            return Err(EscrowError::DurationOutOfRange(format!(
                "new unlock time {end} is not after current unlock time {}",
                old.end
            )));
        }
        self.check_unlock_time(end, now.timestamp)?;

        let new = Lock { amount: old.amount, end };
        self.commit(account, old, new, now, Settlement::Nothing)?;
        info!(%account, from = old.end, to = end, "escrow: lock extended");
        Ok(())
    }

    /// Return the caller's principal once the lock has expired.
    ///
    /// An account without a lock gets `Ok(0)` and nothing changes.
    pub fn withdraw(&mut self, caller: &Caller) -> Result<u128, EscrowError> {
        self.authorize(caller)?;
        let account = caller.sender;
        let now = self.clock.now();
        let old = self.locks(&account);
        if !old.exists() {
            return Ok(0);
        }
        if now.timestamp < old.end {
            return Err(EscrowError::LockNotExpired {
                end: old.end,
                now: now.timestamp,
            });
        }

        let amount = old.amount;
        self.commit(account, old, Lock::default(), now, Settlement::Payout { payee: account, amount })?;
        info!(%account, amount, "escrow: withdrawn");
        Ok(amount)
    }

    /// Bring the global history forward to the current block.
    ///
    /// Appends one point per elapsed week boundary plus one at the current
    /// block and returns how many were appended. A second call at the same
    /// timestamp appends nothing.
    pub fn checkpoint(&mut self) -> usize {
        let now = self.clock.now();
        let last = self.latest_point(now);
        let points = advance(&last, &self.slope_changes, now);
        let appended = points.len();
        self.point_history.extend(points);
        if appended > 0 {
            debug!(appended, epoch = self.epoch(), "escrow: checkpoint");
        }
        appended
    }

    fn active_lock(&self, account: &AccountId, now: u64) -> Result<Lock, EscrowError> {
        let lock = self.locks(account);
        if !lock.exists() {
            return Err(EscrowError::NoActiveLock);
        }
        if lock.is_expired(now) {
            return Err(EscrowError::LockExpired { end: lock.end, now });
        }
        Ok(lock)
    }

    fn check_unlock_time(&self, end: u64, now: u64) -> Result<(), EscrowError> {
        if end <= now {
            return Err(EscrowError::DurationOutOfRange(format!(
                "unlock time {end} is not in the future"
            )));
        }
        let max_end = now.saturating_add(self.config.max_lock_secs);
        if end > max_end {
            return Err(EscrowError::DurationOutOfRange(format!(
                "unlock time {end} exceeds maximum {max_end}"
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Effects, settlement and rollback
    // ------------------------------------------------------------------

    fn commit(
        &mut self,
        account: AccountId,
        old: Lock,
        new: Lock,
        now: BlockInfo,
        settlement: Settlement,
    ) -> Result<(), EscrowError> {
        let savepoint = self.savepoint(account, &[old.end, new.end]);

        if let Err(e) = self.apply_lock(account, old, new, now) {
            self.rollback(savepoint);
            return Err(e);
        }

        let custody = self.config.address;
        let settled = match settlement {
            Settlement::Deposit { payer, amount } => {
                self.token.transfer_from(&custody, &payer, &custody, amount)
            }
            Settlement::Payout { payee, amount } => self.token.transfer(&custody, &payee, amount),
            Settlement::Nothing => Ok(()),
        };
        if let Err(e) = settled {
            warn!(%account, error = %e, "escrow: transfer failed, rolling back");
            self.rollback(savepoint);
            return Err(e.into());
        }
        Ok(())
    }

    fn apply_lock(&mut self, account: AccountId, old: Lock, new: Lock, now: BlockInfo) -> Result<(), EscrowError> {
        self.supply = if new.amount >= old.amount {
            self.supply.checked_add(new.amount - old.amount)
        } else {
            self.supply.checked_sub(old.amount - new.amount)
        }
        .ok_or(EscrowError::ArithmeticOverflow)?;

        if new.exists() {
            self.locks.insert(account, new);
        } else {
            self.locks.remove(&account);
        }
        self.checkpoint_account(account, old, new, now)
    }

    /// Record `account`'s curve change from `old` to `new` in both histories
    /// and in the slope-change table.
    fn checkpoint_account(&mut self, account: AccountId, old: Lock, new: Lock, now: BlockInfo) -> Result<(), EscrowError> {
        let max_lock = self.config.max_lock_secs;
        let (old_bias, old_slope) =
            lock_curve(old.amount, old.end, now.timestamp, max_lock).ok_or(EscrowError::ArithmeticOverflow)?;
        let (new_bias, new_slope) =
            lock_curve(new.amount, new.end, now.timestamp, max_lock).ok_or(EscrowError::ArithmeticOverflow)?;

        let mut head = self.catch_up(now);
        let d_slope = new_slope.checked_sub(old_slope).ok_or(EscrowError::ArithmeticOverflow)?;
        let d_bias = new_bias.checked_sub(old_bias).ok_or(EscrowError::ArithmeticOverflow)?;
        head.slope = head.slope.checked_add(d_slope).ok_or(EscrowError::ArithmeticOverflow)?.max(0);
        head.bias = head.bias.checked_add(d_bias).ok_or(EscrowError::ArithmeticOverflow)?.max(0);
        self.point_history.push(head);

        // The old curve stops being subtracted at its end; the new one starts.
        if old.end > now.timestamp {
            let mut delta = old_slope;
            if new.end == old.end {
                delta -= new_slope;
            }
            self.adjust_slope_change(old.end, delta);
        }
        if new.end > now.timestamp && new.end > old.end {
            self.adjust_slope_change(new.end, -new_slope);
        }

        self.user_point_history.entry(account).or_default().push(Point {
            bias: new_bias,
            slope: new_slope,
            timestamp: now.timestamp,
            block_number: now.number,
        });
        debug!(
            %account,
            bias = new_bias,
            slope = new_slope,
            epoch = self.epoch(),
            "escrow: account checkpoint"
        );
        Ok(())
    }

    /// Append the catch-up points up to (not including) `now` and return the
    /// point for `now`, which the caller adjusts before appending.
    fn catch_up(&mut self, now: BlockInfo) -> Point {
        let last = self.latest_point(now);
        let mut points = advance(&last, &self.slope_changes, now);
        match points.pop() {
            Some(head) => {
                self.point_history.extend(points);
                head
            }
            None => Point {
                block_number: now.number.max(last.block_number),
                ..last
            },
        }
    }

    fn adjust_slope_change(&mut self, week: u64, delta: i128) {
        if delta == 0 {
            return;
        }
        let entry = self.slope_changes.entry(week).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            self.slope_changes.remove(&week);
        }
    }

    fn latest_point(&self, now: BlockInfo) -> Point {
        self.point_history
            .last()
            .copied()
            .unwrap_or_else(|| Point::genesis(now))
    }

    fn savepoint(&self, account: AccountId, weeks: &[u64]) -> Savepoint {
        Savepoint {
            account,
            supply: self.supply,
            lock: self.locks.get(&account).copied(),
            global_len: self.point_history.len(),
            user_len: self.user_point_history.get(&account).map(Vec::len),
            slope_changes: weeks
                .iter()
                .map(|w| (*w, self.slope_changes.get(w).copied()))
                .collect(),
        }
    }

    fn rollback(&mut self, sp: Savepoint) {
        self.supply = sp.supply;
        match sp.lock {
            Some(lock) => {
                self.locks.insert(sp.account, lock);
            }
            None => {
                self.locks.remove(&sp.account);
            }
        }
        self.point_history.truncate(sp.global_len);
        match sp.user_len {
            Some(len) => {
                if let Some(history) = self.user_point_history.get_mut(&sp.account) {
                    history.truncate(len);
                }
            }
            None => {
                self.user_point_history.remove(&sp.account);
            }
        }
        // Restore in reverse so a week listed twice ends at its first capture.
        for (week, value) in sp.slope_changes.into_iter().rev() {
            match value {
                Some(v) => {
                    self.slope_changes.insert(week, v);
                }
                None => {
                    self.slope_changes.remove(&week);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current voting power of `account`.
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        self.balance_of_at_time(account, self.clock.now().timestamp)
    }

    /// Voting power of `account` at `timestamp`, evaluated from the latest
    /// account point recorded at or before it.
    pub fn balance_of_at_time(&self, account: &AccountId, timestamp: u64) -> u128 {
        let Some(history) = self.user_point_history.get(account) else {
            return 0;
        };
        match find_timestamp_epoch(history, timestamp) {
            Some(i) => history[i].value_at(timestamp),
            None => 0,
        }
    }

    /// Voting power of `account` at a past `block`.
    ///
    /// The block's timestamp is interpolated between the global points that
    /// bracket it, assuming a uniform block time between them.
    pub fn balance_of_at(&self, account: &AccountId, block: u64) -> Result<u128, EscrowError> {
        let head = self.clock.now();
        self.check_block(block, head)?;

        let Some(history) = self.user_point_history.get(account) else {
            return Ok(0);
        };
        let Some(user_epoch) = find_block_epoch(history, block) else {
            return Ok(0);
        };
        let Some(block_time) = self.block_timestamp(block, head) else {
            return Ok(0);
        };
        Ok(history[user_epoch].value_at(block_time))
    }

    /// Current total voting power.
    pub fn total_supply(&self) -> u128 {
        self.total_supply_at_time(self.clock.now().timestamp)
    }

    /// Total voting power at `timestamp`.
    ///
    /// Timestamps after the latest checkpoint are answered by replaying the
    /// slope-change table without touching the ledger.
    pub fn total_supply_at_time(&self, timestamp: u64) -> u128 {
        match find_timestamp_epoch(&self.point_history, timestamp) {
            Some(i) => supply_at(&self.point_history[i], timestamp, &self.slope_changes),
            None => 0,
        }
    }

    /// Total voting power at a past `block`.
    pub fn total_supply_at(&self, block: u64) -> Result<u128, EscrowError> {
        let head = self.clock.now();
        self.check_block(block, head)?;
        let Some(epoch) = find_block_epoch(&self.point_history, block) else {
            return Ok(0);
        };
        let point = &self.point_history[epoch];
        let block_time = interpolate_block_time(point, self.point_history.get(epoch + 1), head, block);
        Ok(supply_at(point, block_time, &self.slope_changes))
    }

    fn check_block(&self, block: u64, head: BlockInfo) -> Result<(), EscrowError> {
        if block > head.number {
            return Err(EscrowError::BlockInFuture {
                requested: block,
                current: head.number,
            });
        }
        Ok(())
    }

    fn block_timestamp(&self, block: u64, head: BlockInfo) -> Option<u64> {
        let epoch = find_block_epoch(&self.point_history, block)?;
        let p0 = &self.point_history[epoch];
        Some(interpolate_block_time(p0, self.point_history.get(epoch + 1), head, block))
    }

    /// Total locked principal.
    pub fn supply(&self) -> u128 {
        self.supply
    }

    /// `account`'s lock, or the empty lock.
    pub fn locks(&self, account: &AccountId) -> Lock {
        self.locks.get(account).copied().unwrap_or_default()
    }

    /// Index of the latest global point.
    pub fn epoch(&self) -> usize {
        self.point_history.len().saturating_sub(1)
    }

    /// Number of points recorded for `account`; zero means none.
    pub fn user_point_epoch(&self, account: &AccountId) -> usize {
        self.user_point_history.get(account).map_or(0, Vec::len)
    }

    pub fn point_history(&self, epoch: usize) -> Option<Point> {
        self.point_history.get(epoch).copied()
    }

    /// `account`'s point at `epoch`, counting from 1.
    pub fn user_point_history(&self, account: &AccountId, epoch: usize) -> Option<Point> {
        let index = epoch.checked_sub(1)?;
        self.user_point_history.get(account)?.get(index).copied()
    }

    /// Scheduled change of the aggregate slope at `week`.
    pub fn slope_change(&self, week: u64) -> i128 {
        self.slope_changes.get(&week).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Custody address; payers approve this address.
    pub fn address(&self) -> AccountId {
        self.config.address
    }

    pub fn owner(&self) -> AccountId {
        self.config.owner
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.config.decimals
    }

    pub fn max_lock(&self) -> u64 {
        self.config.max_lock_secs
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// Current chain head as seen by the ledger.
    pub fn now(&self) -> BlockInfo {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwindle_core::clock::ManualClock;
    use dwindle_core::constants::{DEFAULT_MAX_LOCK_SECS, WEEK};
    use dwindle_core::error::TokenError;
    use dwindle_core::token::{MemoryToken, TokenBank};

    const MAX: u128 = DEFAULT_MAX_LOCK_SECS as u128;
    const START: u64 = 100 * WEEK;

    fn acct(b: u8) -> AccountId {
        AccountId::repeat_byte(b)
    }

    fn owner() -> Caller {
        Caller::direct(acct(0xaa))
    }

    struct Fixture {
        escrow: VotingEscrow,
        token: MemoryToken,
        clock: ManualClock,
    }

    impl Fixture {
        fn fund(&self, account: AccountId, amount: u128) {
            self.token.mint(&account, amount);
            self.token.approve(&account, &self.escrow.address(), u128::MAX);
        }
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(BlockInfo::new(1, START));
        let token = TokenBank::new().deploy(acct(0xd0));
        let config = EscrowConfig {
            owner: acct(0xaa),
            ..Default::default()
        };
        let escrow =
            VotingEscrow::new(config, Arc::new(token.clone()), Arc::new(clock.clone())).unwrap();
        let f = Fixture { escrow, token, clock };
        f.fund(acct(1), 1_000 * MAX);
        f.fund(acct(2), 1_000 * MAX);
        f
    }

    fn user(b: u8) -> Caller {
        Caller::direct(acct(b))
    }

    // --- construction ---

    #[test]
    fn new_ledger_has_genesis_point() {
        let f = fixture();
        assert_eq!(f.escrow.epoch(), 0);
        let genesis = f.escrow.point_history(0).unwrap();
        assert_eq!(genesis, Point::genesis(BlockInfo::new(1, START)));
        assert_eq!(f.escrow.total_supply(), 0);
        assert_eq!(f.escrow.supply(), 0);
    }

    #[test]
    fn invalid_config_rejected() {
        let clock = ManualClock::new(BlockInfo::new(1, START));
        let token = TokenBank::new().deploy(acct(0xd0));
        let config = EscrowConfig {
            max_lock_secs: 10,
            ..Default::default()
        };
        assert!(matches!(
            VotingEscrow::new(config, Arc::new(token), Arc::new(clock)),
            Err(EscrowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn metadata_from_config() {
        let f = fixture();
        assert_eq!(f.escrow.symbol(), "veTOKEN");
        assert_eq!(f.escrow.decimals(), 8);
        assert_eq!(f.escrow.max_lock(), DEFAULT_MAX_LOCK_SECS);
        assert_eq!(f.escrow.owner(), acct(0xaa));
    }

    // --- create_lock ---

    #[test]
    fn create_lock_records_curve_and_custody() {
        let mut f = fixture();
        let amount = 10 * MAX;
        f.escrow.create_lock(&user(1), amount, START + 4 * WEEK + 100).unwrap();

        let lock = f.escrow.locks(&acct(1));
        assert_eq!(lock, Lock { amount, end: START + 4 * WEEK });
        assert_eq!(f.escrow.supply(), amount);
        assert_eq!(f.escrow.balance_of(&acct(1)), 10 * (4 * WEEK) as u128);
        assert_eq!(f.escrow.total_supply(), f.escrow.balance_of(&acct(1)));
        assert_eq!(f.escrow.slope_change(START + 4 * WEEK), -10);
        assert_eq!(f.escrow.epoch(), 1);
        assert_eq!(f.escrow.user_point_epoch(&acct(1)), 1);
        assert_eq!(f.token.balance_of(&f.escrow.address()), amount);
        assert_eq!(f.token.balance_of(&acct(1)), 990 * MAX);
    }

    #[test]
    fn create_lock_rejects_zero_amount() {
        let mut f = fixture();
        assert_eq!(
            f.escrow.create_lock(&user(1), 0, START + WEEK),
            Err(EscrowError::InvalidAmount)
        );
    }

    #[test]
    fn create_lock_rejects_past_or_current_week() {
        let mut f = fixture();
        // Rounds down to START, which is not in the future.
        let err = f.escrow.create_lock(&user(1), MAX, START + WEEK - 1).unwrap_err();
        assert!(matches!(err, EscrowError::DurationOutOfRange(_)));
    }

    #[test]
    fn create_lock_rejects_beyond_max() {
        let mut f = fixture();
        let too_far = START + DEFAULT_MAX_LOCK_SECS + WEEK;
        let err = f.escrow.create_lock(&user(1), MAX, too_far).unwrap_err();
        assert!(matches!(err, EscrowError::DurationOutOfRange(_)));
    }

    #[test]
    fn second_lock_rejected() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + WEEK).unwrap();
        assert_eq!(
            f.escrow.create_lock(&user(1), MAX, START + 2 * WEEK),
            Err(EscrowError::LockAlreadyExists)
        );
    }

    #[test]
    fn failed_transfer_leaves_no_trace() {
        let mut f = fixture();
        // Account 3 has neither balance nor allowance.
        let err = f.escrow.create_lock(&user(3), MAX, START + 2 * WEEK).unwrap_err();
        assert_eq!(
            err,
            EscrowError::InsufficientAllowanceOrBalance(TokenError::InsufficientAllowance { have: 0, need: MAX })
        );
        assert_eq!(f.escrow.epoch(), 0);
        assert_eq!(f.escrow.supply(), 0);
        assert_eq!(f.escrow.locks(&acct(3)), Lock::default());
        assert_eq!(f.escrow.user_point_epoch(&acct(3)), 0);
        assert_eq!(f.escrow.slope_change(START + 2 * WEEK), 0);
    }

    #[test]
    fn rollback_after_catch_up_drops_synthetic_points() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + 4 * WEEK).unwrap();
        f.clock.advance(3 * WEEK);
        let epoch = f.escrow.epoch();
        f.token.approve(&acct(1), &f.escrow.address(), 0);
        assert!(f.escrow.increase_lock_amount(&user(1), MAX).is_err());
        assert_eq!(f.escrow.epoch(), epoch);
        assert_eq!(f.escrow.user_point_epoch(&acct(1)), 1);
        assert_eq!(f.escrow.slope_change(START + 4 * WEEK), -1);
        assert_eq!(f.escrow.locks(&acct(1)).amount, MAX);
    }

    // --- whitelist ---

    #[test]
    fn relayed_caller_needs_whitelist() {
        let mut f = fixture();
        let contract = acct(0xc0);
        f.fund(contract, 10 * MAX);
        let relayed = Caller::relayed(contract, acct(1));

        assert!(matches!(
            f.escrow.create_lock(&relayed, MAX, START + WEEK),
            Err(EscrowError::Unauthorized(_))
        ));

        f.escrow.set_whitelisted_caller(&owner(), contract, true).unwrap();
        assert!(f.escrow.is_whitelisted(&contract));
        f.escrow.create_lock(&relayed, MAX, START + WEEK).unwrap();
        assert_eq!(f.escrow.locks(&contract).amount, MAX);
    }

    #[test]
    fn only_owner_manages_whitelist() {
        let mut f = fixture();
        assert!(matches!(
            f.escrow.set_whitelisted_caller(&user(1), acct(0xc0), true),
            Err(EscrowError::Unauthorized(_))
        ));
        f.escrow.set_whitelisted_caller(&owner(), acct(0xc0), true).unwrap();
        f.escrow.set_whitelisted_caller(&owner(), acct(0xc0), false).unwrap();
        assert!(!f.escrow.is_whitelisted(&acct(0xc0)));
    }

    // --- increases ---

    #[test]
    fn increase_amount_keeps_end_and_moves_slope() {
        let mut f = fixture();
        let end = START + 4 * WEEK;
        f.escrow.create_lock(&user(1), 2 * MAX, end).unwrap();
        f.clock.advance(WEEK);
        f.escrow.increase_lock_amount(&user(1), 3 * MAX).unwrap();

        assert_eq!(f.escrow.locks(&acct(1)), Lock { amount: 5 * MAX, end });
        assert_eq!(f.escrow.slope_change(end), -5);
        assert_eq!(f.escrow.balance_of(&acct(1)), 5 * (3 * WEEK) as u128);
        assert_eq!(f.escrow.total_supply(), f.escrow.balance_of(&acct(1)));
        assert_eq!(f.escrow.supply(), 5 * MAX);
    }

    #[test]
    fn increase_amount_preconditions() {
        let mut f = fixture();
        assert_eq!(f.escrow.increase_lock_amount(&user(1), MAX), Err(EscrowError::NoActiveLock));
        f.escrow.create_lock(&user(1), MAX, START + WEEK).unwrap();
        assert_eq!(f.escrow.increase_lock_amount(&user(1), 0), Err(EscrowError::InvalidAmount));
        f.clock.set_timestamp(START + WEEK);
        assert_eq!(
            f.escrow.increase_lock_amount(&user(1), MAX),
            Err(EscrowError::LockExpired { end: START + WEEK, now: START + WEEK })
        );
    }

    #[test]
    fn deposit_for_charges_payer() {
        let mut f = fixture();
        let end = START + 2 * WEEK;
        f.escrow.create_lock(&user(1), MAX, end).unwrap();
        f.escrow.deposit_for(&user(2), acct(1), 2 * MAX).unwrap();

        assert_eq!(f.escrow.locks(&acct(1)), Lock { amount: 3 * MAX, end });
        assert_eq!(f.token.balance_of(&acct(2)), 998 * MAX);
        assert_eq!(f.token.balance_of(&acct(1)), 999 * MAX);
        assert_eq!(f.escrow.locks(&acct(2)), Lock::default());
    }

    #[test]
    fn deposit_for_requires_active_lock() {
        let mut f = fixture();
        assert_eq!(f.escrow.deposit_for(&user(2), acct(1), MAX), Err(EscrowError::NoActiveLock));
    }

    #[test]
    fn increase_duration_moves_slope_change() {
        let mut f = fixture();
        let old_end = START + 2 * WEEK;
        let new_end = START + 6 * WEEK;
        f.escrow.create_lock(&user(1), 3 * MAX, old_end).unwrap();
        f.escrow.increase_lock_duration(&user(1), new_end + 5).unwrap();

        assert_eq!(f.escrow.locks(&acct(1)).end, new_end);
        assert_eq!(f.escrow.slope_change(old_end), 0);
        assert_eq!(f.escrow.slope_change(new_end), -3);
        assert_eq!(f.escrow.balance_of(&acct(1)), 3 * (6 * WEEK) as u128);
        assert_eq!(f.escrow.supply(), 3 * MAX);
        assert_eq!(f.token.balance_of(&f.escrow.address()), 3 * MAX);
    }

    #[test]
    fn increase_duration_must_extend() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + 2 * WEEK).unwrap();
        assert!(matches!(
            f.escrow.increase_lock_duration(&user(1), START + 2 * WEEK + 10),
            Err(EscrowError::DurationOutOfRange(_))
        ));
        assert!(matches!(
            f.escrow.increase_lock_duration(&user(1), START + DEFAULT_MAX_LOCK_SECS + WEEK),
            Err(EscrowError::DurationOutOfRange(_))
        ));
    }

    // --- withdraw ---

    #[test]
    fn withdraw_before_end_rejected() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + WEEK).unwrap();
        f.clock.advance(WEEK - 1);
        assert!(matches!(
            f.escrow.withdraw(&user(1)),
            Err(EscrowError::LockNotExpired { .. })
        ));
    }

    #[test]
    fn dust_lock_has_no_voting_power() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX - 1, START + 4 * WEEK).unwrap();
        assert_eq!(f.escrow.balance_of(&acct(1)), 0);
        assert_eq!(f.escrow.supply(), MAX - 1);

        f.escrow.create_lock(&user(2), MAX, START + 4 * WEEK).unwrap();
        assert_eq!(f.escrow.balance_of(&acct(2)), (4 * WEEK) as u128);
        assert_eq!(f.escrow.total_supply(), (4 * WEEK) as u128);
    }

    #[test]
    fn withdraw_without_lock_is_noop() {
        let mut f = fixture();
        assert_eq!(f.escrow.withdraw(&user(1)), Ok(0));
        assert_eq!(f.escrow.epoch(), 0);
        assert_eq!(f.escrow.user_point_epoch(&acct(1)), 0);
    }

    #[test]
    fn one_week_lock_decays_and_withdraws() {
        let mut f = fixture();
        let amount = 1_000;
        f.escrow.create_lock(&user(1), amount, START + WEEK).unwrap();
        f.clock.advance(WEEK);
        f.escrow.checkpoint();

        assert_eq!(f.escrow.balance_of(&acct(1)), 0);
        assert_eq!(f.escrow.withdraw(&user(1)), Ok(amount));
        assert_eq!(f.escrow.supply(), 0);
        assert_eq!(f.escrow.locks(&acct(1)), Lock::default());
        let last = f.escrow.user_point_history(&acct(1), 2).unwrap();
        assert_eq!((last.bias, last.slope), (0, 0));
        assert_eq!(f.token.balance_of(&acct(1)), 1_000 * MAX);
    }

    #[test]
    fn staggered_expiry_total_matches_survivor() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), 1_000 * MAX / 2, START + WEEK).unwrap();
        f.escrow.create_lock(&user(2), 1_000 * MAX / 2, START + 2 * WEEK).unwrap();
        f.clock.advance(WEEK);

        assert_eq!(f.escrow.balance_of(&acct(1)), 0);
        assert_eq!(f.escrow.total_supply(), f.escrow.balance_of(&acct(2)));
        assert_eq!(f.escrow.balance_of(&acct(2)), 500 * WEEK as u128);
    }

    // --- checkpoint ---

    #[test]
    fn checkpoint_is_idempotent_within_a_timestamp() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + WEEK).unwrap();
        assert_eq!(f.escrow.checkpoint(), 0);
        f.clock.advance(10);
        assert_eq!(f.escrow.checkpoint(), 1);
        assert_eq!(f.escrow.checkpoint(), 0);
    }

    #[test]
    fn long_idle_gap_materialises_every_week() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), 2 * MAX, START + 3 * WEEK).unwrap();
        f.escrow.create_lock(&user(2), MAX, START + 5 * WEEK).unwrap();
        let before = f.escrow.epoch();
        f.clock.advance(10 * WEEK + 5);
        // Boundaries START+1W ..= START+10W, then the current block.
        assert_eq!(f.escrow.checkpoint(), 11);
        assert_eq!(f.escrow.epoch(), before + 11);

        let at = |w: u64| f.escrow.point_history(before + w as usize).unwrap();
        assert_eq!(at(1).timestamp, START + WEEK);
        assert_eq!(at(1).bias, (2 * 2 * WEEK + 4 * WEEK) as i128);
        assert_eq!(at(3).slope, 1);
        assert_eq!(at(3).bias, (2 * WEEK) as i128);
        assert_eq!(at(5).bias, 0);
        assert_eq!(at(5).slope, 0);
        assert_eq!(f.escrow.total_supply(), 0);
    }

    // --- history ---

    #[test]
    fn historical_balance_by_time_and_block() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + 10 * WEEK).unwrap();
        let lock_block = f.clock.now().number;
        f.clock.advance(2 * WEEK);
        f.escrow.increase_lock_amount(&user(1), MAX).unwrap();
        f.clock.advance(WEEK);

        assert_eq!(f.escrow.balance_of_at_time(&acct(1), START), (10 * WEEK) as u128);
        assert_eq!(f.escrow.balance_of_at_time(&acct(1), START + WEEK), (9 * WEEK) as u128);
        assert_eq!(f.escrow.balance_of_at_time(&acct(1), START - 1), 0);
        assert_eq!(f.escrow.balance_of_at(&acct(1), lock_block).unwrap(), (10 * WEEK) as u128);
        assert_eq!(f.escrow.balance_of_at(&acct(1), 0).unwrap(), 0);
        assert_eq!(f.escrow.balance_of_at(&acct(2), lock_block).unwrap(), 0);
    }

    #[test]
    fn future_block_rejected() {
        let f = fixture();
        let head = f.clock.now().number;
        assert_eq!(
            f.escrow.balance_of_at(&acct(1), head + 1),
            Err(EscrowError::BlockInFuture { requested: head + 1, current: head })
        );
        assert!(f.escrow.total_supply_at(head + 1).is_err());
        assert_eq!(f.escrow.total_supply_at(head), Ok(0));
    }

    #[test]
    fn supply_at_block_matches_sum_of_balances() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), 3 * MAX, START + 3 * WEEK).unwrap();
        f.clock.advance(DEFAULT_MAX_LOCK_SECS / 1_000);
        f.escrow.create_lock(&user(2), 5 * MAX, START + 8 * WEEK).unwrap();
        f.clock.advance(4 * WEEK);
        f.escrow.checkpoint();
        f.clock.advance(WEEK / 2);

        let head = f.clock.now().number;
        for block in (1..=head).step_by((head / 37).max(1) as usize) {
            let total = f.escrow.total_supply_at(block).unwrap();
            let sum = f.escrow.balance_of_at(&acct(1), block).unwrap()
                + f.escrow.balance_of_at(&acct(2), block).unwrap();
            assert_eq!(total, sum, "block {block}");
        }
    }

    #[test]
    fn total_supply_ahead_of_checkpoint_is_read_only() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + 2 * WEEK).unwrap();
        let epoch = f.escrow.epoch();
        assert_eq!(f.escrow.total_supply_at_time(START + WEEK), WEEK as u128);
        assert_eq!(f.escrow.total_supply_at_time(START + 3 * WEEK), 0);
        assert_eq!(f.escrow.epoch(), epoch);
    }

    #[test]
    fn user_history_is_one_indexed() {
        let mut f = fixture();
        f.escrow.create_lock(&user(1), MAX, START + WEEK).unwrap();
        assert_eq!(f.escrow.user_point_history(&acct(1), 0), None);
        assert!(f.escrow.user_point_history(&acct(1), 1).is_some());
        assert_eq!(f.escrow.user_point_history(&acct(1), 2), None);
    }
}
