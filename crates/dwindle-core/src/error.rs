//! Error types for Dwindle.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("insufficient allowance: have {have}, need {need}")] InsufficientAllowance { have: u128, need: u128 },
    #[error("unknown token: {0}")] UnknownToken(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("slippage exceeded: got {got}, minimum {min_out}")] SlippageExceeded { got: u128, min_out: u128 },
    #[error("deadline passed: {deadline} < {now}")] DeadlinePassed { deadline: u64, now: u64 },
    #[error("invalid swap path of length {0}")] InvalidPath(usize),
    #[error("no rate for pair {from} -> {to}")] UnknownPair { from: String, to: String },
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error(transparent)] Token(#[from] TokenError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("unknown pool: {0}")] UnknownPool(u64),
    #[error("insufficient stake: have {have}, need {need}")] InsufficientStake { have: u128, need: u128 },
    #[error(transparent)] Token(#[from] TokenError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("invalid amount: must be greater than zero")] InvalidAmount,
    #[error("no active lock")] NoActiveLock,
    #[error("lock already exists")] LockAlreadyExists,
    #[error("lock not expired: unlocks at {end}, now {now}")] LockNotExpired { end: u64, now: u64 },
    #[error("lock expired at {end}, now {now}")] LockExpired { end: u64, now: u64 },
    #[error("duration out of range: {0}")] DurationOutOfRange(String),
    #[error("insufficient allowance or balance: {0}")] InsufficientAllowanceOrBalance(#[from] TokenError),
    #[error("unauthorized caller: {0}")] Unauthorized(String),
    #[error("block {requested} is after current block {current}")] BlockInFuture { requested: u64, current: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("invalid config: {0}")] InvalidConfig(String),
    #[error("snapshot: {0}")] Snapshot(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributorError {
    #[error("unauthorized caller: {0}")] Unauthorized(String),
    #[error("distributor is killed")] Killed,
    #[error("invalid config: {0}")] InvalidConfig(String),
    #[error("invalid epoch {0}: must be week-aligned and not in the past")] InvalidEpoch(u64),
    #[error("invalid amount: must be greater than zero")] InvalidAmount,
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("insufficient allowance or balance: {0}")] InsufficientAllowanceOrBalance(#[from] TokenError),
    #[error(transparent)] Escrow(#[from] EscrowError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid amount: must be greater than zero")] InvalidAmount,
    #[error("insufficient shares: have {have}, need {need}")] InsufficientShares { have: u128, need: u128 },
    #[error("unauthorized caller: {0}")] Unauthorized(String),
    #[error("invalid fee: {0} bps")] InvalidFee(u128),
    #[error("invalid config: {0}")] InvalidConfig(String),
    #[error("vault lock has been withdrawn; shares outstanding must be redeemed first")] Unlocked,
    #[error("vault lock not expired: unlocks at {end}, now {now}")] LockNotExpired { end: u64, now: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("slippage exceeded: {0}")] SlippageExceeded(#[from] RouterError),
    #[error("insufficient allowance or balance: {0}")] InsufficientAllowanceOrBalance(#[from] TokenError),
    #[error(transparent)] Escrow(#[from] EscrowError),
    #[error(transparent)] Distributor(#[from] DistributorError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeederError {
    #[error("unauthorized caller: {0}")] Unauthorized(String),
    #[error("invalid amount: must be greater than zero")] InvalidAmount,
    #[error("invalid config: {0}")] InvalidConfig(String),
    #[error(transparent)] Pool(#[from] PoolError),
    #[error(transparent)] Token(#[from] TokenError),
    #[error(transparent)] Distributor(#[from] DistributorError),
}

#[derive(Error, Debug)]
pub enum DwindleError {
    #[error(transparent)] Token(#[from] TokenError),
    #[error(transparent)] Router(#[from] RouterError),
    #[error(transparent)] Pool(#[from] PoolError),
    #[error(transparent)] Escrow(#[from] EscrowError),
    #[error(transparent)] Distributor(#[from] DistributorError),
    #[error(transparent)] Vault(#[from] VaultError),
    #[error(transparent)] Feeder(#[from] FeederError),
}
