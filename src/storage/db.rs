// Database - RocksDB-backed StateStore
// One write batch per block transition keeps the all-or-nothing contract.
use super::{StateStore, StoreError};
use crate::types::{Account, Address};
use rocksdb::{Options, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const PREFIX_ACCOUNT: &[u8] = b"account:";
const PREFIX_CONSENSUS: &[u8] = b"consensus:";
const PREFIX_CHAIN: &[u8] = b"chain:";

/// Thin wrapper around RocksDB
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_keep_log_file_num(5);
        opts.set_max_background_jobs(2);

        let db = DB::open(&opts, path).map_err(|e| DatabaseError::OpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.db
            .get(key)
            .map_err(|e| DatabaseError::ReadFailed(e.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DatabaseError> {
        self.db
            .put(key, value)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), DatabaseError> {
        self.db
            .delete(key)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }

    /// Atomic batch write
    pub fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), DatabaseError> {
        let mut batch = rocksdb::WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.put(&key, &value),
                WriteOp::Delete { key } => batch.delete(&key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database read failed: {0}")]
    ReadFailed(String),

    #[error("Database write failed: {0}")]
    WriteFailed(String),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

fn prefixed(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

/// Durable `StateStore`: reads hit the overlay first and fall through to
/// RocksDB; `commit` flushes the overlay through one atomic batch.
pub struct RocksStateStore {
    db: Database,
    dirty_accounts: BTreeMap<Address, Account>,
    dirty_consensus: BTreeMap<String, Option<Vec<u8>>>,
    dirty_chain: BTreeMap<String, String>,
}

impl RocksStateStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            dirty_accounts: BTreeMap::new(),
            dirty_consensus: BTreeMap::new(),
            dirty_chain: BTreeMap::new(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn commit(&mut self) -> Result<(), StoreError> {
        let mut ops = Vec::new();

        for (address, account) in std::mem::take(&mut self.dirty_accounts) {
            let value = bincode::serialize(&account)
                .map_err(|e| StoreError::Corrupted(format!("account encode: {e}")))?;
            ops.push(WriteOp::Put {
                key: prefixed(PREFIX_ACCOUNT, address.as_bytes()),
                value,
            });
        }
        for (key, value) in std::mem::take(&mut self.dirty_consensus) {
            let key = prefixed(PREFIX_CONSENSUS, key.as_bytes());
            match value {
                Some(value) => ops.push(WriteOp::Put { key, value }),
                None => ops.push(WriteOp::Delete { key }),
            }
        }
        for (key, value) in std::mem::take(&mut self.dirty_chain) {
            ops.push(WriteOp::Put {
                key: prefixed(PREFIX_CHAIN, key.as_bytes()),
                value: value.into_bytes(),
            });
        }

        self.db.batch_write(ops)?;
        Ok(())
    }

    pub fn discard(&mut self) {
        self.dirty_accounts.clear();
        self.dirty_consensus.clear();
        self.dirty_chain.clear();
    }
}

impl StateStore for RocksStateStore {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        if let Some(account) = self.dirty_accounts.get(address) {
            return Ok(Some(account.clone()));
        }
        match self.db.get(&prefixed(PREFIX_ACCOUNT, address.as_bytes()))? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupted(format!("account decode: {e}"))),
            None => Ok(None),
        }
    }

    fn set_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.dirty_accounts.insert(account.address, account);
        Ok(())
    }

    fn get_consensus_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.dirty_consensus.get(key) {
            return Ok(value.clone());
        }
        Ok(self.db.get(&prefixed(PREFIX_CONSENSUS, key.as_bytes()))?)
    }

    fn set_consensus_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.dirty_consensus.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn delete_consensus_state(&mut self, key: &str) -> Result<(), StoreError> {
        self.dirty_consensus.insert(key.to_string(), None);
        Ok(())
    }

    fn get_chain_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.dirty_chain.get(key) {
            return Ok(Some(value.clone()));
        }
        match self.db.get(&prefixed(PREFIX_CHAIN, key.as_bytes()))? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupted(format!("chain state decode: {e}"))),
            None => Ok(None),
        }
    }

    fn set_chain_state(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.dirty_chain.insert(key.to_string(), value);
        Ok(())
    }
}
