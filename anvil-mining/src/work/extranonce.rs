//! Extra-nonce counters.
//!
//! The header nonce only spans 32 bits, so each poll folds a fresh extra
//! nonce into the coinbase script. That changes the coinbase txid and with
//! it the transaction root, which gives every issued header a distinct
//! cache key even when the underlying candidate is reused.
//!
//! Two policies exist:
//!
//! - Solo work restarts the counter whenever the previous-block hash
//!   changes and otherwise increments it on every poll.
//! - Merged work increments on every poll but rolls back to 1 once the
//!   counter reaches [`ROLL_THRESHOLD`] and the header time has moved on by
//!   more than a second since the last roll. Keeping the value small keeps
//!   the commitment script short; requiring the header time to move keeps
//!   every header issued with the same extra nonce distinct.

use bitcoin::BlockHash;

/// Merged-mining counters roll over once they reach this value.
pub const ROLL_THRESHOLD: u32 = 0x7f;

/// Per-context extra-nonce state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraNonce {
    value: u32,
    prev_block: Option<BlockHash>,
    prev_roll_time: u64,
}

impl ExtraNonce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without advancing.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Advance the solo counter for work built on `prev_block`.
    pub fn next_for_block(&mut self, prev_block: BlockHash) -> u32 {
        if self.prev_block != Some(prev_block) {
            self.value = 0;
            self.prev_block = Some(prev_block);
        }
        self.value = self.value.wrapping_add(1);
        self.value
    }

    /// Advance the merged-mining counter for a header stamped `time`.
    pub fn next_rolling(&mut self, time: u64) -> u32 {
        self.value = self.value.wrapping_add(1);
        if self.value >= ROLL_THRESHOLD && time > self.prev_roll_time + 1 {
            self.value = 1;
            self.prev_roll_time = time;
        }
        self.value
    }
}
