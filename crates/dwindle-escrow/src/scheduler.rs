//! Week-by-week catch-up of the global curve history.
//!
//! The aggregate slope only changes at week boundaries (where locks expire),
//! so the global history stays exact as long as one point exists per elapsed
//! boundary. [`advance`] produces exactly those points, however long the
//! ledger sat idle, followed by a point at the current block.

use std::collections::BTreeMap;

use dwindle_core::constants::{BLOCK_SLOPE_PRECISION, WEEK, floor_week};
use dwindle_core::types::{BlockInfo, Point};
use tracing::debug;

use crate::curve::project;

/// Bring the aggregate curve forward from `last` to `now`.
///
/// Returns one point per week boundary strictly between `last.timestamp` and
/// `now.timestamp`, each carrying the slope change scheduled for that
/// boundary, followed by a final point at `now` with the real block number.
/// A boundary that coincides with `now` is folded into the final point.
/// Returns an empty vector when `now` is not after `last`.
///
/// Intermediate points get block numbers extrapolated from the average block
/// time over `[last, now]`.
pub fn advance(last: &Point, slope_changes: &BTreeMap<u64, i128>, now: BlockInfo) -> Vec<Point> {
    if now.timestamp <= last.timestamp {
        return Vec::new();
    }

    let elapsed = (now.timestamp - last.timestamp) as u128;
    let block_slope =
        BLOCK_SLOPE_PRECISION * now.number.saturating_sub(last.block_number) as u128 / elapsed;

    let mut points = Vec::with_capacity(((now.timestamp - last.timestamp) / WEEK + 1) as usize);
    let mut bias = last.bias;
    let mut slope = last.slope;
    let mut cursor = last.timestamp;
    let mut week = floor_week(last.timestamp);

    loop {
        week += WEEK;
        let step_to = week.min(now.timestamp);
        let d_slope = if week <= now.timestamp {
            slope_changes.get(&week).copied().unwrap_or(0)
        } else {
            0
        };
        bias = project(bias, slope, cursor, step_to);
        slope = (slope + d_slope).max(0);
        cursor = step_to;

        if step_to == now.timestamp {
            points.push(Point {
                bias,
                slope,
                timestamp: now.timestamp,
                block_number: now.number,
            });
            break;
        }

        let estimated = last.block_number as u128
            + block_slope * (step_to - last.timestamp) as u128 / BLOCK_SLOPE_PRECISION;
        points.push(Point {
            bias,
            slope,
            timestamp: step_to,
            block_number: estimated as u64,
        });
    }

    debug!(
        from = last.timestamp,
        to = now.timestamp,
        weeks = points.len() - 1,
        "scheduler: advanced global curve"
    );
    points
}
