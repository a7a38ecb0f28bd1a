// Errors - Crate-level error taxonomy
// Precondition violations carry the offending round/height; storage faults
// propagate unchanged; integrity faults are fatal and never self-repaired.
use crate::consensus::random_seed::RandomSeedError;
use crate::storage::StoreError;
use crate::types::{Address, Height, Round, Slot};

#[derive(Debug, thiserror::Error)]
pub enum DposError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    RandomSeed(#[from] RandomSeedError),

    #[error("No vote weight snapshot found for round {round}")]
    NoVoteWeightSnapshot { round: Round },

    #[error("No delegate list found for round {round}")]
    NoForgersList { round: Round },

    #[error("Vote weight not found for round {round}")]
    VoteWeightNotFound { round: Round },

    #[error("Delegate list for round {round} already exists")]
    DuplicateForgersList { round: Round },

    #[error("Cannot undo the genesis block")]
    CannotUndoGenesis,

    #[error("No delegate list history exists")]
    NoForgersListHistory,

    #[error("Requested {requested} rounds but only {available} rounds exist")]
    TooManyRoundsRequested { requested: Round, available: Round },

    #[error(
        "Failed to verify slot: {slot}. Expected generator: {expected}, \
         received block with generator: {actual} at height {height}"
    )]
    ForgerMismatch {
        height: Height,
        slot: Slot,
        expected: Address,
        actual: Address,
    },

    #[error("Delegate {address} is not active at the requested height")]
    DelegateNotActive { address: Address },
}
