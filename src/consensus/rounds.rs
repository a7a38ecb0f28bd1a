// Rounds - Height/round and timestamp/slot arithmetic
use crate::types::{Height, Round, Slot, Timestamp};
use serde::{Deserialize, Serialize};

/// Round arithmetic over a fixed round length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rounds {
    pub blocks_per_round: u64,
}

impl Rounds {
    pub fn new(blocks_per_round: u64) -> Self {
        debug_assert!(blocks_per_round > 0);
        Self { blocks_per_round }
    }

    /// `ceil(height / blocks_per_round)`; total and monotonic
    pub fn calc_round(&self, height: Height) -> Round {
        height.div_ceil(self.blocks_per_round)
    }

    pub fn calc_round_start_height(&self, round: Round) -> Height {
        round.saturating_sub(1) * self.blocks_per_round + 1
    }

    pub fn calc_round_end_height(&self, round: Round) -> Height {
        round * self.blocks_per_round
    }

    pub fn calc_round_middle_height(&self, round: Round) -> Height {
        self.calc_round_start_height(round) + self.blocks_per_round / 2
    }

    pub fn is_last_block_of_round(&self, height: Height) -> bool {
        height % self.blocks_per_round == 0
    }
}

/// Slot arithmetic anchored at the chain epoch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    pub epoch_time: Timestamp,
    pub block_interval: u64,
}

impl Slots {
    pub fn new(epoch_time: Timestamp, block_interval: u64) -> Self {
        debug_assert!(block_interval > 0);
        Self {
            epoch_time,
            block_interval,
        }
    }

    pub fn slot_number(&self, timestamp: Timestamp) -> Slot {
        timestamp.saturating_sub(self.epoch_time) / self.block_interval
    }
}
