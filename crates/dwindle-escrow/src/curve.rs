//! Curve evaluation and history search.
//!
//! Histories are append-only and ordered by block number (and therefore by
//! timestamp), so every lookup is a binary search via `partition_point`.

use std::collections::BTreeMap;

use dwindle_core::constants::{WEEK, floor_week};
use dwindle_core::types::{BlockInfo, Point};

/// Index of the latest point recorded at or before `block`.
///
/// Returns `None` when every point is later than `block`. When several points
/// share a block number the last of them wins.
pub fn find_block_epoch(history: &[Point], block: u64) -> Option<usize> {
    history
        .partition_point(|p| p.block_number <= block)
        .checked_sub(1)
}

/// Index of the latest point recorded at or before `timestamp`.
pub fn find_timestamp_epoch(history: &[Point], timestamp: u64) -> Option<usize> {
    history
        .partition_point(|p| p.timestamp <= timestamp)
        .checked_sub(1)
}

/// Estimate the timestamp of `block` by linear interpolation.
///
/// `p0` is the latest global point at or before `block`; `next` is the point
/// after it, or `None` when `p0` is the most recent one, in which case the
/// current `head` closes the interval. Assumes a uniform block time between
/// the two bracketing samples.
pub fn interpolate_block_time(p0: &Point, next: Option<&Point>, head: BlockInfo, block: u64) -> u64 {
    let (end_block, end_time) = match next {
        Some(p1) => (p1.block_number, p1.timestamp),
        None => (head.number, head.timestamp),
    };
    let d_block = end_block.saturating_sub(p0.block_number) as u128;
    let d_t = end_time.saturating_sub(p0.timestamp) as u128;
    if d_block == 0 {
        return p0.timestamp;
    }
    let into = block.saturating_sub(p0.block_number) as u128;
    p0.timestamp + (d_t * into / d_block) as u64
}

/// Bias and slope of a single lock's curve at `now`.
///
/// Zero for missing or expired locks. The slope is truncated, so the initial
/// bias is slightly below `amount * remaining / max_lock`.
pub fn lock_curve(amount: u128, end: u64, now: u64, max_lock: u64) -> Option<(i128, i128)> {
    if amount == 0 || end <= now {
        return Some((0, 0));
    }
    let slope = i128::try_from(amount / max_lock as u128).ok()?;
    let bias = slope.checked_mul((end - now) as i128)?;
    Some((bias, slope))
}

/// Move one aggregate curve segment forward from `from` to `to` seconds.
///
/// Bias and slope never go below zero.
pub(crate) fn project(bias: i128, slope: i128, from: u64, to: u64) -> i128 {
    let dt = to.saturating_sub(from) as i128;
    bias.saturating_sub(slope.saturating_mul(dt)).max(0)
}

/// Aggregate curve value at `timestamp`, starting from `point` and applying
/// every scheduled slope change at the week boundaries in between.
///
/// Read-only counterpart of [`scheduler::advance`](crate::scheduler::advance):
/// evaluating here gives the same value a checkpoint at `timestamp` would record.
pub fn supply_at(point: &Point, timestamp: u64, slope_changes: &BTreeMap<u64, i128>) -> u128 {
    if timestamp <= point.timestamp {
        return point.value_at(timestamp);
    }
    let mut bias = point.bias;
    let mut slope = point.slope;
    let mut last = point.timestamp;
    let mut week = floor_week(point.timestamp);
    loop {
        week += WEEK;
        if week >= timestamp {
            bias = project(bias, slope, last, timestamp);
            break;
        }
        bias = project(bias, slope, last, week);
        slope = (slope + slope_changes.get(&week).copied().unwrap_or(0)).max(0);
        last = week;
        if bias == 0 && slope == 0 {
            break;
        }
    }
    bias.max(0) as u128
}
