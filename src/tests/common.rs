// Test harness - An in-memory chain wired to the engine
use crate::config::DposConfig;
use crate::consensus::engine::DposEngine;
use crate::storage::{ChainDataAccess, MemStateStore, StateStore, StoreError};
use crate::types::{
    stripped_hash, Account, Address, Balance, BlockHeader, BlockHeaderAsset, Hash32, Height,
    PublicKey, SeedReveal, Vote, UNIT,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Chain history backed by a shared header vector, so headers forged after
/// engine construction stay visible to it.
pub struct MockChain {
    headers: Rc<RefCell<Vec<BlockHeader>>>,
    genesis_accounts: Vec<Account>,
}

impl MockChain {
    pub fn empty() -> Self {
        Self {
            headers: Rc::new(RefCell::new(Vec::new())),
            genesis_accounts: Vec::new(),
        }
    }
}

impl ChainDataAccess for MockChain {
    fn get_block_headers_by_height_between(
        &self,
        from: Height,
        to: Height,
    ) -> Result<Vec<BlockHeader>, StoreError> {
        Ok(self
            .headers
            .borrow()
            .iter()
            .filter(|header| header.height >= from && header.height <= to)
            .cloned()
            .collect())
    }

    fn get_delegate_accounts(&self, limit: usize) -> Result<Vec<Account>, StoreError> {
        Ok(self.genesis_accounts.iter().take(limit).cloned().collect())
    }
}

/// Genesis delegate with a self-vote, named and funded for snapshots
pub fn delegate(seed: u8, vote_weight: Balance) -> Account {
    let key = PublicKey::from_bytes([seed; 32]);
    let mut account = Account::new(key.address(), key);
    account.username = format!("genesis_{seed}");
    account.vote_weight = vote_weight;
    account.sent_votes.push(Vote {
        delegate_address: account.address,
        amount: 10 * UNIT,
    });
    account
}

/// Engine, store and forging loop in one place. Each delegate carries a
/// precomputed hash onion so forged reveal chains validate.
pub struct TestNet {
    pub engine: DposEngine<MockChain>,
    pub store: MemStateStore,
    headers: Rc<RefCell<Vec<BlockHeader>>>,
    onions: BTreeMap<Address, Vec<SeedReveal>>,
    keys: BTreeMap<Address, PublicKey>,
}

impl TestNet {
    /// Bootstrap a network and apply the genesis block, forged by the
    /// first delegate with zero reward and fee.
    pub fn new(config: DposConfig, delegates: Vec<Account>) -> Self {
        let headers = Rc::new(RefCell::new(Vec::new()));
        let chain = MockChain {
            headers: Rc::clone(&headers),
            genesis_accounts: delegates.clone(),
        };
        let engine = DposEngine::new(config, chain);

        let mut store = MemStateStore::new();
        let mut onions = BTreeMap::new();
        let mut keys = BTreeMap::new();
        for account in &delegates {
            onions.insert(account.address, reveal_onion(account.address, 64));
            keys.insert(account.address, account.public_key);
            store.insert_account(account.clone());
        }

        let genesis = delegates[0].address;
        let mut net = Self {
            engine,
            store,
            headers,
            onions,
            keys,
        };
        net.forge(genesis, 0, 0);
        net
    }

    /// Forge the next block. Returns whether the round changed.
    pub fn forge(&mut self, generator: Address, reward: Balance, total_fee: Balance) -> bool {
        let height = self.headers.borrow().len() as Height + 1;
        let forged_before = self
            .headers
            .borrow()
            .iter()
            .filter(|header| header.generator_address() == generator)
            .count();
        let reveal = self.onions[&generator][forged_before];

        let header = BlockHeader {
            id: Hash32::hash(&height.to_be_bytes()),
            height,
            timestamp: height * self.engine.config().block_interval,
            generator_public_key: self.keys[&generator],
            reward,
            total_fee,
            asset: BlockHeaderAsset {
                seed_reveal: reveal,
            },
        };
        self.headers.borrow_mut().push(header.clone());
        self.engine.apply(&header, &mut self.store).unwrap()
    }

    /// Undo the tip block and drop it from history
    pub fn undo_tip(&mut self) {
        let header = self.headers.borrow().last().cloned().unwrap();
        self.engine.undo(&header, &mut self.store).unwrap();
        self.headers.borrow_mut().pop();
    }

    pub fn tip_header(&self) -> BlockHeader {
        self.headers.borrow().last().cloned().unwrap()
    }

    pub fn account(&self, address: &Address) -> Account {
        self.store.get_account(address).unwrap().unwrap()
    }
}

/// Hash onion of length `len`: each reveal is the preimage of the previous
/// block's reveal by the same delegate.
fn reveal_onion(address: Address, len: usize) -> Vec<SeedReveal> {
    let mut chain = vec![SeedReveal::from_bytes(
        *stripped_hash(address.as_bytes()).as_bytes(),
    )];
    for _ in 1..len {
        let next = stripped_hash(chain.last().unwrap().as_bytes());
        chain.push(SeedReveal::from_bytes(*next.as_bytes()));
    }
    chain.reverse();
    chain
}

/// Three active slots plus one standby slot: a four-block round
pub fn small_config() -> DposConfig {
    DposConfig {
        active_delegates: 3,
        standby_delegates: 1,
        ..DposConfig::default()
    }
}
