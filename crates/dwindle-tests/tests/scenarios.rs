//! End-to-end scenarios across the escrow, distributor, vault and feeder.

use std::sync::Arc;

use dwindle_core::constants::{DAY, UNIT, WEEK, floor_week};
use dwindle_core::router::FixedRateRouter;
use dwindle_core::traits::{FungibleToken, SwapRouter};
use dwindle_core::types::Caller;
use dwindle_feeder::{FeederConfig, MemoryStakingPool, RewardFeeder};
use dwindle_tests::helpers::*;
use dwindle_vault::{CompoundingVault, HarvestSource, VaultConfig};

// ---------------------------------------------------------------------------
// Escrow
// ---------------------------------------------------------------------------

#[test]
fn one_week_lock_decays_to_zero_and_returns_principal() {
    let mut env = Env::new();
    env.lock(1, 1_000 * UNIT, START + WEEK);
    assert!(env.escrow.balance_of(&acct(1)) > 0);

    env.clock.advance(WEEK);
    env.escrow.checkpoint();
    assert_eq!(env.escrow.balance_of(&acct(1)), 0);
    assert_eq!(env.escrow.total_supply(), 0);

    assert_eq!(env.escrow.withdraw(&user(1)).unwrap(), 1_000 * UNIT);
    assert_eq!(env.escrow.supply(), 0);
    assert_eq!(env.principal.balance_of(&acct(1)), 1_000 * UNIT);
    assert!(!env.escrow.locks(&acct(1)).exists());
}

#[test]
fn staggered_locks_leave_only_the_survivor() {
    let mut env = Env::new();
    env.lock(1, 1_000 * UNIT, START + WEEK);
    env.lock(2, 1_000 * UNIT, START + 2 * WEEK);

    env.clock.advance(WEEK);
    assert_eq!(env.escrow.balance_of(&acct(1)), 0);
    assert!(env.escrow.balance_of(&acct(2)) > 0);
    assert_eq!(env.escrow.total_supply(), env.escrow.balance_of(&acct(2)));

    env.escrow.checkpoint();
    assert_eq!(env.escrow.total_supply(), env.escrow.balance_of(&acct(2)));
}

#[test]
fn fresh_lock_starts_near_amount_times_remaining_fraction() {
    let mut env = Env::new();
    let amount = 5_000 * UNIT;
    let end = START + 52 * WEEK;
    env.lock(1, amount, end);

    let expected = amount * (end - START) as u128 / MAX;
    let actual = env.escrow.balance_of(&acct(1));
    assert!(actual <= expected);
    assert!(expected - actual <= (end - START) as u128);
}

#[test]
fn idle_gap_is_caught_up_week_by_week() {
    let mut env = Env::new();
    env.lock(1, 2 * MAX, START + 4 * WEEK);
    env.lock(2, MAX, START + 30 * WEEK);
    let epoch = env.escrow.epoch();

    env.clock.advance(20 * WEEK);
    let appended = env.escrow.checkpoint();
    // Nineteen interior boundaries plus the point at now.
    assert_eq!(appended, 20);
    assert_eq!(env.escrow.epoch(), epoch + 20);

    for w in 1..20u64 {
        let p = env.escrow.point_history(epoch + w as usize).unwrap();
        assert_eq!(p.timestamp, START + w * WEEK);
        let expected_slope = if w < 4 { 3 } else { 1 };
        assert_eq!(p.slope, expected_slope, "slope after week {w}");
    }
    assert_eq!(env.escrow.total_supply(), (10 * WEEK) as u128);
}

// ---------------------------------------------------------------------------
// Distributor
// ---------------------------------------------------------------------------

#[test]
fn epoch_reward_splits_sixty_forty() {
    let mut env = Env::new();
    env.lock(1, 6 * MAX, START + 10 * WEEK);
    env.lock(2, 4 * MAX, START + 10 * WEEK);

    let reward = env.bank.deploy(acct(0xe0));
    let mut dist = env.distributor(&reward, false);
    reward.mint(&OPERATOR, 100);
    reward.approve(&OPERATOR, &dist.address(), u128::MAX);
    dist.fund_epoch(&operator(), START, 100).unwrap();

    env.clock.advance(WEEK + 1);
    dist.checkpoint_token(&operator()).unwrap();

    assert_eq!(dist.claimable(&env.escrow, &acct(1)).unwrap(), 60);
    assert_eq!(dist.claim(&env.escrow, &acct(1)).unwrap(), 60);
    assert_eq!(dist.claim(&env.escrow, &acct(2)).unwrap(), 40);
    assert_eq!(dist.claim(&env.escrow, &acct(1)).unwrap(), 0);
    assert_eq!(dist.claim(&env.escrow, &acct(2)).unwrap(), 0);
    assert_eq!(reward.balance_of(&acct(1)), 60);
    assert_eq!(reward.balance_of(&acct(2)), 40);
    assert_eq!(reward.balance_of(&dist.address()), 0);
}

#[test]
fn streamed_rewards_over_idle_weeks_are_fully_claimable() {
    let mut env = Env::new();
    env.lock(1, 2 * MAX, START + 4 * WEEK);
    env.lock(2, MAX, START + 60 * WEEK);

    let reward = env.bank.deploy(acct(0xe0));
    let mut dist = env.distributor(&reward, false);
    reward.mint(&dist.address(), 20_000);

    env.clock.advance(20 * WEEK);
    dist.checkpoint_token(&operator()).unwrap();
    for w in 0..20u64 {
        assert_eq!(dist.tokens_per_week(START + w * WEEK), 1_000);
    }

    // Account 1 withdraws first; its past weeks stay claimable.
    assert_eq!(env.escrow.withdraw(&user(1)).unwrap(), 2 * MAX);
    let first = dist.claim(&env.escrow, &acct(1)).unwrap();
    let second = dist.claim(&env.escrow, &acct(2)).unwrap();
    assert!(first > 0 && first < 4_000);
    assert!(second > 16_000);
    assert!(20_000 - (first + second) <= 20);
    assert_eq!(dist.user_week_cursor(&acct(1)), Some(START + 20 * WEEK));
}

#[test]
fn kill_sweeps_unclaimed_rewards() {
    let mut env = Env::new();
    env.lock(1, MAX, START + 10 * WEEK);
    let reward = env.bank.deploy(acct(0xe0));
    let mut dist = env.distributor(&reward, false);
    reward.mint(&dist.address(), 500);

    assert!(dist.kill(&user(1)).is_err());
    assert_eq!(dist.kill(&operator()).unwrap(), 500);
    assert_eq!(reward.balance_of(&EMERGENCY), 500);
    assert!(dist.claim(&env.escrow, &acct(1)).is_err());
    assert_eq!(dist.claimable(&env.escrow, &acct(1)).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

struct VaultEnv {
    env: Env,
    vault: CompoundingVault,
    router: Arc<FixedRateRouter>,
}

fn vault_env(lock_duration_secs: u64, fee_bps: u128) -> VaultEnv {
    let mut env = Env::new();
    let router = Arc::new(FixedRateRouter::new(
        acct(0x70),
        env.bank.clone(),
        Arc::new(env.clock.clone()),
    ));
    let vault = CompoundingVault::new(
        VaultConfig {
            owner: OPERATOR,
            treasury: acct(0x7e),
            treasury_fee_bps: fee_bps,
            lock_duration_secs,
            ..Default::default()
        },
        Arc::new(env.principal.clone()),
        router.clone(),
        Arc::new(env.clock.clone()),
    )
    .unwrap();
    env.escrow
        .set_whitelisted_caller(&operator(), vault.address(), true)
        .unwrap();
    VaultEnv { env, vault, router }
}

impl VaultEnv {
    fn deposit(&mut self, b: u8, amount: u128) -> u128 {
        self.env.principal.mint(&acct(b), amount);
        self.env
            .principal
            .approve(&acct(b), &self.vault.address(), u128::MAX);
        self.vault
            .deposit(&user(b), &mut self.env.escrow, amount)
            .unwrap()
    }
}

#[test]
fn vault_shares_and_payouts_are_proportional_net_of_fee() {
    let mut v = vault_env(2 * WEEK, 1_000);
    let s1 = v.deposit(1, 10 * UNIT);
    let s2 = v.deposit(2, 20 * UNIT);
    assert_eq!(s2, 2 * s1);

    let reward = v.env.bank.deploy(acct(0xe0));
    v.router.set_rate(reward.address(), PRINCIPAL, 1, 1);
    v.env.principal.mint(&v.router.address(), 1_000 * UNIT);
    let mut dist = v.env.distributor(&reward, false);
    reward.mint(&OPERATOR, 300 * UNIT);
    reward.approve(&OPERATOR, &dist.address(), u128::MAX);
    dist.fund_epoch(&operator(), START, 300 * UNIT).unwrap();

    v.env.clock.advance(WEEK + 1);
    dist.checkpoint_token(&operator()).unwrap();
    let mut sources = [HarvestSource {
        distributor: &mut dist,
        reward_token: Arc::new(reward.clone()),
        swap_path: vec![reward.address(), PRINCIPAL],
        min_out: 0,
    }];
    let report = v
        .vault
        .harvest(&operator(), &mut v.env.escrow, &mut sources)
        .unwrap();
    assert_eq!(report.sources[0].claimed, 300 * UNIT);
    assert_eq!(report.sources[0].fee, 30 * UNIT);
    assert_eq!(report.reinvested, 270 * UNIT);
    assert_eq!(reward.balance_of(&acct(0x7e)), 30 * UNIT);
    assert_eq!(v.vault.total_principal(&v.env.escrow), 300 * UNIT);

    v.env.clock.set_timestamp(START + 2 * WEEK);
    assert_eq!(
        v.vault.withdraw(&user(1), &mut v.env.escrow, s1).unwrap(),
        100 * UNIT
    );
    assert_eq!(
        v.vault.withdraw(&user(2), &mut v.env.escrow, s2).unwrap(),
        200 * UNIT
    );
    assert_eq!(v.vault.total_shares(), 0);
    assert_eq!(v.env.principal.balance_of(&v.vault.address()), 0);
    assert_eq!(v.env.escrow.supply(), 0);
}

#[test]
fn vault_second_create_lock_rejected_until_drained() {
    let mut v = vault_env(WEEK, 0);
    v.env.principal.mint(&OPERATOR, 10 * MAX);
    v.env
        .principal
        .approve(&OPERATOR, &v.vault.address(), u128::MAX);
    v.vault
        .create_lock(&operator(), &mut v.env.escrow, MAX)
        .unwrap();
    assert!(
        v.vault
            .create_lock(&operator(), &mut v.env.escrow, MAX)
            .is_err()
    );

    v.env.clock.advance(WEEK);
    let out = v
        .vault
        .withdraw(&operator(), &mut v.env.escrow, MAX)
        .unwrap();
    assert_eq!(out, MAX);
    v.vault
        .create_lock(&operator(), &mut v.env.escrow, MAX)
        .unwrap();
    assert_eq!(
        v.env.escrow.locks(&v.vault.address()).end,
        floor_week(START + 2 * WEEK)
    );
}

// ---------------------------------------------------------------------------
// Feeder into distributor into vault
// ---------------------------------------------------------------------------

#[test]
fn feeder_rewards_compound_into_the_vault_lock() {
    let mut v = vault_env(DAY * 365, 0);
    v.deposit(1, 4 * MAX);

    // The distributor pays in the principal token, so harvest needs no swap.
    let principal = v.env.principal.clone();
    let mut dist = v.env.distributor(&principal, true);
    let proxy = v.env.bank.deploy(acct(0x50));
    let pool = Arc::new(MemoryStakingPool::new(acct(0x5f), Arc::new(principal.clone())));
    pool.add_pool(0, Arc::new(proxy.clone()));
    let feeder = RewardFeeder::new(
        FeederConfig {
            owner: OPERATOR,
            ..Default::default()
        },
        Arc::new(proxy.clone()),
        Arc::new(principal.clone()),
        pool.clone(),
    )
    .unwrap();
    proxy.mint(&feeder.address(), 1);
    feeder.pool_deposit(&operator(), 1).unwrap();

    principal.mint(&acct(0x5f), 5_000);
    pool.accrue(0, 5_000).unwrap();
    v.env.clock.advance(WEEK / 2);
    assert_eq!(feeder.feed(&Caller::direct(acct(9)), &mut dist).unwrap(), 5_000);
    assert_eq!(dist.tokens_per_week(START), 5_000);

    v.env.clock.advance(WEEK);
    let locked_before = v.env.escrow.locks(&v.vault.address()).amount;
    let mut sources = [HarvestSource {
        distributor: &mut dist,
        reward_token: Arc::new(principal.clone()),
        swap_path: Vec::new(),
        min_out: 0,
    }];
    let report = v
        .vault
        .harvest(&operator(), &mut v.env.escrow, &mut sources)
        .unwrap();
    assert_eq!(report.reinvested, 5_000);
    assert_eq!(
        v.env.escrow.locks(&v.vault.address()).amount,
        locked_before + 5_000
    );
    assert_eq!(
        v.vault.principal_of(&v.env.escrow, &acct(1)).unwrap(),
        4 * MAX + 5_000
    );
}
