//! Manually driven chain clock.
//!
//! [`ManualClock`] is a cloneable handle onto a shared chain head, so every
//! component built from the same clock observes the same block. Advancing
//! time always mines at least one block.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::DEFAULT_BLOCK_TIME_SECS;
use crate::traits::Clock;
use crate::types::BlockInfo;

/// Shared, test-controllable chain head.
#[derive(Debug, Clone)]
pub struct ManualClock {
    head: Arc<RwLock<BlockInfo>>,
    block_time_secs: u64,
}

impl ManualClock {
    /// Start the chain at `start` with the default block time.
    pub fn new(start: BlockInfo) -> Self {
        Self::with_block_time(start, DEFAULT_BLOCK_TIME_SECS)
    }

    /// Start the chain at `start`, producing one block every `block_time_secs`.
    pub fn with_block_time(start: BlockInfo, block_time_secs: u64) -> Self {
        Self {
            head: Arc::new(RwLock::new(start)),
            block_time_secs: block_time_secs.max(1),
        }
    }

    /// Mine a single block.
    pub fn mine(&self) -> BlockInfo {
        let mut head = self.head.write();
        head.number += 1;
        head.timestamp += self.block_time_secs;
        *head
    }

    /// Move time forward by `secs`, mining the blocks that fit in that span
    /// (at least one).
    pub fn advance(&self, secs: u64) -> BlockInfo {
        let mut head = self.head.write();
        head.number += (secs / self.block_time_secs).max(1);
        head.timestamp += secs;
        *head
    }

    /// Jump to `timestamp` (which must not be in the past), mining blocks as
    /// [`advance`](Self::advance) does.
    pub fn set_timestamp(&self, timestamp: u64) -> BlockInfo {
        let now = self.head.read().timestamp;
        self.advance(timestamp.saturating_sub(now))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> BlockInfo {
        *self.head.read()
    }
}
