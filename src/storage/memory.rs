// Memory store - In-memory StateStore with a buffered overlay
// Reference implementation of the commit contract: mutations live in the
// overlay until `commit`, so a failed block transition leaves no trace.
use super::{StateStore, StoreError};
use crate::types::{Account, Address};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MemStateStore {
    accounts: BTreeMap<Address, Account>,
    consensus: BTreeMap<String, Vec<u8>>,
    chain: BTreeMap<String, String>,

    // overlay: None = pending deletion
    dirty_accounts: BTreeMap<Address, Account>,
    dirty_consensus: BTreeMap<String, Option<Vec<u8>>>,
    dirty_chain: BTreeMap<String, String>,
}

impl MemStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed account, bypassing the overlay (test setup)
    pub fn insert_account(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    /// Make all buffered mutations durable
    pub fn commit(&mut self) {
        let dirty_accounts = std::mem::take(&mut self.dirty_accounts);
        self.accounts.extend(dirty_accounts);

        for (key, value) in std::mem::take(&mut self.dirty_consensus) {
            match value {
                Some(bytes) => {
                    self.consensus.insert(key, bytes);
                }
                None => {
                    self.consensus.remove(&key);
                }
            }
        }

        let dirty_chain = std::mem::take(&mut self.dirty_chain);
        self.chain.extend(dirty_chain);
    }

    /// Drop all buffered mutations
    pub fn discard(&mut self) {
        self.dirty_accounts.clear();
        self.dirty_consensus.clear();
        self.dirty_chain.clear();
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.dirty_accounts.is_empty()
            || !self.dirty_consensus.is_empty()
            || !self.dirty_chain.is_empty()
    }
}

impl StateStore for MemStateStore {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        if let Some(account) = self.dirty_accounts.get(address) {
            return Ok(Some(account.clone()));
        }
        Ok(self.accounts.get(address).cloned())
    }

    fn set_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.dirty_accounts.insert(account.address, account);
        Ok(())
    }

    fn get_consensus_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.dirty_consensus.get(key) {
            return Ok(value.clone());
        }
        Ok(self.consensus.get(key).cloned())
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
        Ok(self.chain.get(key).cloned())
    }

    fn set_chain_state(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.dirty_chain.insert(key.to_string(), value);
        Ok(())
    }
}
