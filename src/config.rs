// Config - Engine parameters injected at construction
// Principle: No process-wide singletons; every constant travels with the engine
use crate::types::{Balance, Height, Round, Timestamp, UNIT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Historical consensus override for a single round.
/// Applied before fee division and remainder computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundException {
    /// Multiplier applied to every block reward of the round
    pub rewards_factor: u64,
    /// Multiplier applied to the round's fee pool
    pub fees_factor: u64,
    /// Flat amount added to the fee pool after multiplication
    pub fees_bonus: Balance,
}

/// DPoS engine configuration. `Default` carries the mainnet parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposConfig {
    /// Delegates forging by vote-weight rank
    pub active_delegates: u32,

    /// Delegates admitted per round through the weighted lottery
    pub standby_delegates: u32,

    /// How many rounds ahead of the closing round a forger list is computed
    pub delegate_list_round_offset: Round,

    /// Chain epoch time; slot 0 starts here
    pub epoch_time: Timestamp,

    /// Seconds per block slot
    pub block_interval: u64,

    /// Minimum vote weight for unconditional snapshot membership
    pub standby_threshold: Balance,

    /// Standby lottery cap: a candidate's draw weight is at most
    /// total_candidate_weight / vote_weight_cap_rate
    pub vote_weight_cap_rate: u64,

    /// Blocks a proven misbehavior keeps a delegate out of snapshots
    pub punishment_window: Height,

    /// BFT lag subtracted when pruning finalized forger lists
    pub bft_round_offset: Round,

    /// Rounds of forger-list history the min-active-height walk may use
    pub delegate_active_round_limit: Round,

    /// Historical per-round overrides, keyed by round number
    pub round_exceptions: BTreeMap<Round, RoundException>,
}

impl DposConfig {
    /// Blocks (and forging slots) per round
    pub fn round_length(&self) -> u64 {
        u64::from(self.active_delegates) + u64::from(self.standby_delegates)
    }

    /// Snapshot target size: pad up to this many entries when fewer
    /// delegates clear the standby threshold
    pub fn snapshot_target(&self) -> usize {
        self.round_length() as usize
    }

    pub fn exception_for(&self, round: Round) -> Option<&RoundException> {
        self.round_exceptions.get(&round)
    }
}

impl Default for DposConfig {
    fn default() -> Self {
        Self {
            active_delegates: 101,
            standby_delegates: 2,
            delegate_list_round_offset: 2,
            epoch_time: 0,
            block_interval: 10,
            standby_threshold: 1000 * UNIT,
            vote_weight_cap_rate: 10,
            punishment_window: 780_000,
            bft_round_offset: 2,
            delegate_active_round_limit: 3,
            round_exceptions: BTreeMap::new(),
        }
    }
}
