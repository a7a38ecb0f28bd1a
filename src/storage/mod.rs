// Storage - State-store contract and persisted consensus records
// Principle: One binary codec behind one get/set contract; the engine never
// talks to a database directly.

pub mod db;
pub mod memory;

pub use db::{Database, DatabaseError, RocksStateStore, WriteOp};
pub use memory::MemStateStore;

use crate::types::{Account, Address, Balance, BlockHeader, Height, Round};
use serde::{Deserialize, Serialize};

/// Consensus-state key for the binary forger-list record
pub const CONSENSUS_STATE_FORGERS_LIST_KEY: &str = "dpos:forgersList";

/// Consensus-state key for the binary vote-weights record
pub const CONSENSUS_STATE_VOTE_WEIGHTS_KEY: &str = "dpos:voteWeights";

/// Legacy chain-state key (JSON namespace) for registered delegates
pub const CHAIN_STATE_DELEGATE_USERNAMES_KEY: &str = "dpos:registeredDelegates";

/// Storage faults. `Corrupted` is a data-integrity fault and fatal to the
/// round transition; the engine does not attempt self-repair.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Corrupted consensus state: {0}")]
    Corrupted(String),
}

/// Scoped, transactional state access. All engine mutations go through this
/// trait and become visible only if the enclosing block transition commits.
pub trait StateStore {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError>;
    fn set_account(&mut self, account: Account) -> Result<(), StoreError>;

    fn get_consensus_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set_consensus_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn delete_consensus_state(&mut self, key: &str) -> Result<(), StoreError>;

    /// Legacy JSON-string namespace, kept for records that predate the
    /// binary codec
    fn get_chain_state(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_chain_state(&mut self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Read access to chain history, supplied by the node
pub trait ChainDataAccess {
    /// Headers with `from <= height <= to`, ascending by height
    fn get_block_headers_by_height_between(
        &self,
        from: Height,
        to: Height,
    ) -> Result<Vec<BlockHeader>, StoreError>;

    /// Initial delegate accounts for the genesis bootstrap path
    fn get_delegate_accounts(&self, limit: usize) -> Result<Vec<Account>, StoreError>;
}

// ---------------------------------------------------------------------------
// Persisted records (logical schemas of the consensus state)
// ---------------------------------------------------------------------------

/// One forger list per round: the shuffled forging order plus which members
/// entered through the standby lottery (`standby` is a subset of `delegates`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgersListEntry {
    pub round: Round,
    pub delegates: Vec<Address>,
    pub standby: Vec<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgersList {
    pub forgers_list: Vec<ForgersListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateVoteWeight {
    pub address: Address,
    pub vote_weight: Balance,
}

/// Vote-weight ranking snapshotted for a future round's forger selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteWeightsEntry {
    pub round: Round,
    pub delegates: Vec<DelegateVoteWeight>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteWeights {
    pub vote_weights: Vec<VoteWeightsEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDelegate {
    pub address: Address,
    pub username: String,
}

/// Registered delegate directory, stored in the legacy JSON namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateUsernames {
    pub registered_delegates: Vec<RegisteredDelegate>,
}

// ---------------------------------------------------------------------------
// Record accessors
// ---------------------------------------------------------------------------

pub fn get_forgers_list<S: StateStore + ?Sized>(
    store: &S,
) -> Result<Vec<ForgersListEntry>, StoreError> {
    match store.get_consensus_state(CONSENSUS_STATE_FORGERS_LIST_KEY)? {
        Some(bytes) => bincode::deserialize::<ForgersList>(&bytes)
            .map(|record| record.forgers_list)
            .map_err(|err| StoreError::Corrupted(format!("forgers list: {err}"))),
        None => Ok(Vec::new()),
    }
}

pub fn set_forgers_list<S: StateStore + ?Sized>(
    store: &mut S,
    mut entries: Vec<ForgersListEntry>,
) -> Result<(), StoreError> {
    entries.sort_by_key(|entry| entry.round);
    let bytes = bincode::serialize(&ForgersList {
        forgers_list: entries,
    })
    .map_err(|err| StoreError::Corrupted(format!("forgers list encode: {err}")))?;
    store.set_consensus_state(CONSENSUS_STATE_FORGERS_LIST_KEY, bytes)
}

pub fn get_vote_weights<S: StateStore + ?Sized>(
    store: &S,
) -> Result<Vec<VoteWeightsEntry>, StoreError> {
    match store.get_consensus_state(CONSENSUS_STATE_VOTE_WEIGHTS_KEY)? {
        Some(bytes) => bincode::deserialize::<VoteWeights>(&bytes)
            .map(|record| record.vote_weights)
            .map_err(|err| StoreError::Corrupted(format!("vote weights: {err}"))),
        None => Ok(Vec::new()),
    }
}

pub fn set_vote_weights<S: StateStore + ?Sized>(
    store: &mut S,
    mut entries: Vec<VoteWeightsEntry>,
) -> Result<(), StoreError> {
    entries.sort_by_key(|entry| entry.round);
    let bytes = bincode::serialize(&VoteWeights {
        vote_weights: entries,
    })
    .map_err(|err| StoreError::Corrupted(format!("vote weights encode: {err}")))?;
    store.set_consensus_state(CONSENSUS_STATE_VOTE_WEIGHTS_KEY, bytes)
}

pub fn get_registered_delegates<S: StateStore + ?Sized>(
    store: &S,
) -> Result<Vec<RegisteredDelegate>, StoreError> {
    match store.get_chain_state(CHAIN_STATE_DELEGATE_USERNAMES_KEY)? {
        Some(json) => serde_json::from_str::<DelegateUsernames>(&json)
            .map(|record| record.registered_delegates)
            .map_err(|err| StoreError::Corrupted(format!("registered delegates: {err}"))),
        None => Ok(Vec::new()),
    }
}

pub fn set_registered_delegates<S: StateStore + ?Sized>(
    store: &mut S,
    registered_delegates: Vec<RegisteredDelegate>,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(&DelegateUsernames {
        registered_delegates,
    })
    .map_err(|err| StoreError::Corrupted(format!("registered delegates encode: {err}")))?;
    store.set_chain_state(CHAIN_STATE_DELEGATE_USERNAMES_KEY, json)
}

/// Fetch an account, materializing a placeholder for addresses the ledger
/// has only seen through a forger list.
pub fn account_or_placeholder<S: StateStore + ?Sized>(
    store: &S,
    address: &Address,
) -> Result<Account, StoreError> {
    Ok(store
        .get_account(address)?
        .unwrap_or_else(|| Account::placeholder(*address)))
}
