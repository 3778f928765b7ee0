//! Protocol constants. All token amounts are in base units (1 token = [`UNIT`] base units).

/// Base units per whole token.
///
/// A lock's slope is `amount / max_lock_secs` in base units, truncated. Locks
/// smaller than `max_lock_secs` base units (about 1.26 tokens under the
/// default maximum) therefore carry no voting power and earn no rewards.
pub const UNIT: u128 = 100_000_000;

pub const HOUR: u64 = 3_600;
pub const DAY: u64 = 24 * HOUR;

/// Length of one ledger week. Lock ends, slope changes and distributor
/// epochs are all aligned to multiples of this value.
pub const WEEK: u64 = 7 * DAY;

/// Default maximum lock duration: four 365-day years.
///
/// A lock of `amount` held for the full duration starts with a voting power
/// of (almost exactly) `amount`.
pub const DEFAULT_MAX_LOCK_SECS: u64 = 4 * 365 * DAY;

/// Fixed-point precision for the blocks-per-second estimate used when the
/// scheduler synthesises block numbers for intermediate week points.
pub const BLOCK_SLOPE_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Basis point denominator (10_000 = 100%).
pub const BPS_PRECISION: u128 = 10_000;

/// Default delay after which anyone may checkpoint distributor tokens.
pub const DEFAULT_TOKEN_CHECKPOINT_DEADLINE_SECS: u64 = DAY;

/// Default block time of [`ManualClock`](crate::clock::ManualClock).
pub const DEFAULT_BLOCK_TIME_SECS: u64 = 3;

/// Round a timestamp down to the start of its week.
///
/// # Examples
///
/// ```
/// use dwindle_core::constants::{floor_week, WEEK};
/// assert_eq!(floor_week(WEEK * 3 + 17), WEEK * 3);
/// assert_eq!(floor_week(WEEK), WEEK);
/// ```
pub fn floor_week(timestamp: u64) -> u64 {
    timestamp / WEEK * WEEK
}

/// Round a timestamp up to the next week boundary (identity on boundaries).
///
/// # Examples
///
/// ```
/// use dwindle_core::constants::{ceil_week, WEEK};
/// assert_eq!(ceil_week(WEEK * 3 + 1), WEEK * 4);
/// assert_eq!(ceil_week(WEEK * 3), WEEK * 3);
/// ```
pub fn ceil_week(timestamp: u64) -> u64 {
    floor_week(timestamp.saturating_add(WEEK - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn week_is_seven_days() {
        assert_eq!(WEEK, 604_800);
    }

    #[test]
    fn max_lock_is_four_years() {
        assert_eq!(DEFAULT_MAX_LOCK_SECS, 126_144_000);
    }

    #[test]
    fn floor_week_zero() {
        assert_eq!(floor_week(0), 0);
        assert_eq!(floor_week(WEEK - 1), 0);
    }

    #[test]
    fn ceil_week_zero() {
        assert_eq!(ceil_week(0), 0);
        assert_eq!(ceil_week(1), WEEK);
    }

    proptest! {
        #[test]
        fn floor_week_aligned_and_not_after(t in 0u64..=u64::MAX / 2) {
            let w = floor_week(t);
            prop_assert_eq!(w % WEEK, 0);
            prop_assert!(w <= t);
            prop_assert!(t - w < WEEK);
        }

        #[test]
        fn ceil_week_aligned_and_not_before(t in 0u64..=u64::MAX / 2) {
            let w = ceil_week(t);
            prop_assert_eq!(w % WEEK, 0);
            prop_assert!(w >= t);
            prop_assert!(w - t < WEEK);
        }
    }
}
