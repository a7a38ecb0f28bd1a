// Account - Delegate ledger entries mutated by the round transition engine
use super::primitives::{Address, Balance, Height, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single vote cast by an account for a delegate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub delegate_address: Address,
    pub amount: Balance,
}

/// Ledger account. Accounts are append-only: the engine mutates the
/// delegate bookkeeping fields but never destroys an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub public_key: PublicKey,

    /// Registered delegate name; empty for plain accounts
    pub username: String,

    pub balance: Balance,

    /// Cumulative fees earned from forging
    pub fees: Balance,

    /// Cumulative block rewards earned from forging
    pub rewards: Balance,

    pub produced_blocks: u64,
    pub missed_blocks: u64,

    /// Aggregate stake backing this delegate
    pub vote_weight: Balance,

    /// Votes this account has cast, in cast order
    pub sent_votes: Vec<Vote>,

    pub is_banned: bool,

    /// Heights at which this delegate was proven to misbehave.
    /// Non-empty and recent means the delegate is currently punished.
    pub pom_heights: Vec<Height>,
}

impl Account {
    pub fn new(address: Address, public_key: PublicKey) -> Self {
        Self {
            address,
            public_key,
            username: String::new(),
            balance: 0,
            fees: 0,
            rewards: 0,
            produced_blocks: 0,
            missed_blocks: 0,
            vote_weight: 0,
            sent_votes: Vec::new(),
            is_banned: false,
            pom_heights: Vec::new(),
        }
    }

    /// Placeholder account for an address seen only through a forger list
    pub fn placeholder(address: Address) -> Self {
        Self::new(address, PublicKey::from_bytes([0u8; 32]))
    }

    pub fn is_delegate(&self) -> bool {
        !self.username.is_empty()
    }

    /// A delegate only counts toward snapshots if it votes for itself
    pub fn self_votes(&self) -> bool {
        self.sent_votes
            .iter()
            .any(|vote| vote.delegate_address == self.address)
    }

    /// Distinct delegates this account voted for, in address order
    pub fn distinct_voted_delegates(&self) -> BTreeSet<Address> {
        self.sent_votes
            .iter()
            .map(|vote| vote.delegate_address)
            .collect()
    }

    /// Whether a proof-of-misbehavior still disqualifies this delegate at
    /// `height`. The punishment window starts at the latest PoM height.
    pub fn is_currently_punished(&self, height: Height, punishment_window: u64) -> bool {
        match self.pom_heights.iter().max() {
            Some(&pom_height) => height < pom_height.saturating_add(punishment_window),
            None => false,
        }
    }
}
