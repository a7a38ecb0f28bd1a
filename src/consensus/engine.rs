// Round transition engine - apply/undo state machine
// A transition either completes every mutation for a block or leaves state
// untouched; chain history is fetched before the first store write and the
// store's commit contract covers the rest.
use super::forgers::{self, CappedWeighting, StandbyWeighting};
use super::random_seed::generate_random_seeds;
use super::rounds::{Rounds, Slots};
use super::vote_weight::{
    create_genesis_vote_weight_snapshot, create_vote_weight_snapshot,
};
use crate::config::DposConfig;
use crate::error::DposError;
use crate::storage::{
    self, account_or_placeholder, ChainDataAccess, DelegateVoteWeight, ForgersListEntry,
    RegisteredDelegate, StateStore,
};
use crate::types::{Address, Balance, BlockHeader, Height, Round};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Payload of the round-changed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundChangeEvent {
    pub old_round: Round,
    pub new_round: Round,
}

type RoundChangeHook = Box<dyn Fn(&RoundChangeEvent) + Send + Sync>;

/// What one forger earned over a round
#[derive(Debug, Clone, Copy, Default)]
struct ForgerEarnings {
    forged_blocks: u64,
    reward: Balance,
    fee: Balance,
}

impl ForgerEarnings {
    fn total(&self) -> Balance {
        self.reward + self.fee
    }
}

/// Immutable settlement plan for a closing round, computed once and applied
/// with either sign
struct RoundSummary {
    earnings: BTreeMap<Address, ForgerEarnings>,
    missed: Vec<Address>,
}

/// DPoS consensus engine. Owns its configuration and arithmetic; all
/// durable state flows through the caller-supplied `StateStore`.
pub struct DposEngine<C: ChainDataAccess> {
    config: DposConfig,
    pub(crate) rounds: Rounds,
    pub(crate) slots: Slots,
    chain: C,
    weighting: Box<dyn StandbyWeighting + Send + Sync>,
    hooks: Vec<RoundChangeHook>,
}

impl<C: ChainDataAccess> DposEngine<C> {
    pub fn new(config: DposConfig, chain: C) -> Self {
        let rounds = Rounds::new(config.round_length());
        let slots = Slots::new(config.epoch_time, config.block_interval);
        let weighting = Box::new(CappedWeighting {
            cap_rate: config.vote_weight_cap_rate,
        });
        Self {
            config,
            rounds,
            slots,
            chain,
            weighting,
            hooks: Vec::new(),
        }
    }

    /// Swap the standby lottery weighting (protocol parameter)
    pub fn with_standby_weighting(
        mut self,
        weighting: Box<dyn StandbyWeighting + Send + Sync>,
    ) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn config(&self) -> &DposConfig {
        &self.config
    }

    pub fn rounds(&self) -> &Rounds {
        &self.rounds
    }

    pub fn subscribe_round_change(&mut self, hook: RoundChangeHook) {
        self.hooks.push(hook);
    }

    fn emit_round_change(&self, event: RoundChangeEvent) {
        info!(
            old_round = event.old_round,
            new_round = event.new_round,
            "round changed"
        );
        for hook in &self.hooks {
            hook(&event);
        }
    }

    // -----------------------------------------------------------------------
    // apply
    // -----------------------------------------------------------------------

    /// Apply one accepted block. Returns whether the round changed.
    pub fn apply<S: StateStore + ?Sized>(
        &self,
        header: &BlockHeader,
        store: &mut S,
    ) -> Result<bool, DposError> {
        if header.height == 1 {
            self.apply_genesis(store)?;
            return Ok(false);
        }

        if !self.rounds.is_last_block_of_round(header.height) {
            self.shift_produced_blocks(header, store, true)?;
            return Ok(false);
        }

        // Round boundary: fetch all history up front so a failed fetch
        // aborts before any mutation.
        let round = self.rounds.calc_round(header.height);
        let context = self.fetch_round_context(header)?;

        self.shift_produced_blocks(header, store, true)?;

        let forgers_entry = self.forgers_entry_for_round(round, store)?;
        let round_headers = self.headers_of_round(round, &context);
        let summary = self.summarize_round(round, &round_headers, &forgers_entry);
        self.settle_round(&summary, store, true)?;

        create_vote_weight_snapshot(&self.config, &self.rounds, header.height, store)?;

        let seeds = generate_random_seeds(round, &self.rounds, &context)?;
        let next_list_round = round + 1 + self.config.delegate_list_round_offset;
        forgers::update_forgers_list(
            &self.config,
            &self.rounds,
            next_list_round,
            &seeds,
            self.weighting.as_ref(),
            store,
        )?;

        self.prune_round_history(round, store)?;

        self.emit_round_change(RoundChangeEvent {
            old_round: round,
            new_round: round + 1,
        });
        Ok(true)
    }

    /// Genesis bootstrap: forger lists for the first rounds come straight
    /// from the initial delegate accounts; there is no vote history to
    /// snapshot yet.
    fn apply_genesis<S: StateStore + ?Sized>(&self, store: &mut S) -> Result<(), DposError> {
        let accounts = self
            .chain
            .get_delegate_accounts(self.config.round_length() as usize)?;

        let mut ranked: Vec<DelegateVoteWeight> = accounts
            .iter()
            .map(|account| DelegateVoteWeight {
                address: account.address,
                vote_weight: account.vote_weight,
            })
            .collect();
        forgers::sort_by_vote_weight(&mut ranked);
        let ordered: Vec<Address> = ranked.iter().map(|d| d.address).collect();

        let mut forgers_list = storage::get_forgers_list(store)?;
        for round in 1..=1 + self.config.delegate_list_round_offset {
            if forgers_list.iter().any(|entry| entry.round == round) {
                return Err(DposError::DuplicateForgersList { round });
            }
            forgers_list.push(ForgersListEntry {
                round,
                delegates: ordered.clone(),
                standby: Vec::new(),
            });
        }
        storage::set_forgers_list(store, forgers_list)?;

        let registered: Vec<RegisteredDelegate> = accounts
            .iter()
            .filter(|account| account.is_delegate())
            .map(|account| RegisteredDelegate {
                address: account.address,
                username: account.username.clone(),
            })
            .collect();
        storage::set_registered_delegates(store, registered)?;

        create_genesis_vote_weight_snapshot(&self.config, &accounts, store)?;

        info!(
            delegates = ordered.len(),
            rounds = 1 + self.config.delegate_list_round_offset,
            "initialized genesis forger lists"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // undo
    // -----------------------------------------------------------------------

    /// Roll back one block; the exact algebraic inverse of `apply`.
    pub fn undo<S: StateStore + ?Sized>(
        &self,
        header: &BlockHeader,
        store: &mut S,
    ) -> Result<(), DposError> {
        if header.height == 1 {
            return Err(DposError::CannotUndoGenesis);
        }

        if !self.rounds.is_last_block_of_round(header.height) {
            self.shift_produced_blocks(header, store, false)?;
            return Ok(());
        }

        let round = self.rounds.calc_round(header.height);
        let context = self.fetch_round_context(header)?;

        self.shift_produced_blocks(header, store, false)?;

        let forgers_entry = self.forgers_entry_for_round(round, store)?;
        let round_headers = self.headers_of_round(round, &context);
        let summary = self.summarize_round(round, &round_headers, &forgers_entry);
        self.settle_round(&summary, store, false)?;

        // Remove exactly what the mirrored apply created: the forger list
        // one lookahead ahead and the snapshot one round beyond that.
        let offset = self.config.delegate_list_round_offset;
        let forgers_list = storage::get_forgers_list(store)?;
        let kept: Vec<ForgersListEntry> = forgers_list
            .into_iter()
            .filter(|entry| entry.round <= round + offset)
            .collect();
        storage::set_forgers_list(store, kept)?;

        let vote_weights = storage::get_vote_weights(store)?;
        let kept: Vec<_> = vote_weights
            .into_iter()
            .filter(|entry| entry.round <= round + 1 + offset)
            .collect();
        storage::set_vote_weights(store, kept)?;

        self.emit_round_change(RoundChangeEvent {
            old_round: round + 1,
            new_round: round,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // finalization pruning
    // -----------------------------------------------------------------------

    /// Drop forger-list history that BFT finality made unreachable
    pub fn on_block_finalized<S: StateStore + ?Sized>(
        &self,
        store: &mut S,
        finalized_height: Height,
    ) -> Result<(), DposError> {
        let finalized_round =
            finalized_height.div_ceil(u64::from(self.config.active_delegates));
        let limit = finalized_round
            .saturating_sub(self.config.bft_round_offset + self.config.delegate_active_round_limit);

        let forgers_list = storage::get_forgers_list(store)?;
        let before = forgers_list.len();
        let kept: Vec<ForgersListEntry> = forgers_list
            .into_iter()
            .filter(|entry| entry.round >= limit)
            .collect();
        let removed = before - kept.len();
        storage::set_forgers_list(store, kept)?;

        if removed > 0 {
            debug!(finalized_height, limit, removed, "pruned finalized forger lists");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // internals
    // -----------------------------------------------------------------------

    /// Headers of the closing round and the two rounds before it (seed
    /// derivation needs the longer window), including the block being
    /// applied or undone.
    fn fetch_round_context(&self, header: &BlockHeader) -> Result<Vec<BlockHeader>, DposError> {
        let round = self.rounds.calc_round(header.height);
        let from_round = round.saturating_sub(2).max(1);
        let from = self.rounds.calc_round_start_height(from_round);
        let mut headers = self
            .chain
            .get_block_headers_by_height_between(from, header.height - 1)?;
        headers.push(header.clone());
        Ok(headers)
    }

    fn headers_of_round<'a>(
        &self,
        round: Round,
        context: &'a [BlockHeader],
    ) -> Vec<&'a BlockHeader> {
        context
            .iter()
            .filter(|header| self.rounds.calc_round(header.height) == round)
            .collect()
    }

    pub(crate) fn forgers_entry_for_round<S: StateStore + ?Sized>(
        &self,
        round: Round,
        store: &S,
    ) -> Result<ForgersListEntry, DposError> {
        storage::get_forgers_list(store)?
            .into_iter()
            .find(|entry| entry.round == round)
            .ok_or(DposError::NoForgersList { round })
    }

    fn shift_produced_blocks<S: StateStore + ?Sized>(
        &self,
        header: &BlockHeader,
        store: &mut S,
        forward: bool,
    ) -> Result<(), DposError> {
        let address = header.generator_address();
        let mut account = account_or_placeholder(store, &address)?;
        if forward {
            account.produced_blocks += 1;
        } else {
            account.produced_blocks = account.produced_blocks.saturating_sub(1);
        }
        store.set_account(account)?;
        Ok(())
    }

    /// Settlement plan for a closing round: fee split, remainder, reward
    /// sums and the missed-block list. Exception overrides are applied
    /// before the fee division so the remainder reflects the adjusted pool.
    fn summarize_round(
        &self,
        round: Round,
        round_headers: &[&BlockHeader],
        forgers_entry: &ForgersListEntry,
    ) -> RoundSummary {
        let exception = self.config.exception_for(round);
        let rewards_factor = exception.map_or(1, |e| e.rewards_factor);
        let fees_factor = exception.map_or(1, |e| e.fees_factor);
        let fees_bonus = exception.map_or(0, |e| e.fees_bonus);

        let total_fee: Balance = round_headers.iter().map(|h| h.total_fee).sum();
        let fee_pool = total_fee * Balance::from(fees_factor) + fees_bonus;
        let active = Balance::from(self.config.active_delegates);
        let fee_per_delegate = fee_pool / active;
        let remainder = fee_pool - fee_per_delegate * active;

        let mut earnings: BTreeMap<Address, ForgerEarnings> = BTreeMap::new();
        for header in round_headers {
            let entry = earnings.entry(header.generator_address()).or_default();
            entry.forged_blocks += 1;
            entry.reward += header.reward * Balance::from(rewards_factor);
        }
        for entry in earnings.values_mut() {
            entry.fee = fee_per_delegate * Balance::from(entry.forged_blocks);
        }

        // the remainder goes only to the forger of the round's last block
        if let Some(last) = round_headers.iter().max_by_key(|h| h.height) {
            if let Some(entry) = earnings.get_mut(&last.generator_address()) {
                entry.fee += remainder;
            }
        }

        let forged: BTreeSet<Address> = earnings.keys().copied().collect();
        let missed: Vec<Address> = forgers_entry
            .delegates
            .iter()
            .filter(|address| !forged.contains(address))
            .copied()
            .collect();

        RoundSummary { earnings, missed }
    }

    /// Apply a round summary with either sign: `forward` adds balances and
    /// increments counters, the inverse subtracts and decrements.
    fn settle_round<S: StateStore + ?Sized>(
        &self,
        summary: &RoundSummary,
        store: &mut S,
        forward: bool,
    ) -> Result<(), DposError> {
        for address in &summary.missed {
            let mut account = account_or_placeholder(store, address)?;
            if forward {
                account.missed_blocks += 1;
            } else {
                account.missed_blocks = account.missed_blocks.saturating_sub(1);
            }
            store.set_account(account)?;
        }

        for (address, earned) in &summary.earnings {
            let mut account = account_or_placeholder(store, address)?;
            if forward {
                account.balance += earned.total();
                account.fees += earned.fee;
                account.rewards += earned.reward;
            } else {
                account.balance = account.balance.saturating_sub(earned.total());
                account.fees = account.fees.saturating_sub(earned.fee);
                account.rewards = account.rewards.saturating_sub(earned.reward);
            }
            store.set_account(account)?;
        }

        // vote-weight propagation: each forger's full round earning is
        // credited once per distinct voted delegate
        for (address, earned) in &summary.earnings {
            let forger = account_or_placeholder(store, address)?;
            for voted in forger.distinct_voted_delegates() {
                let mut target = account_or_placeholder(store, &voted)?;
                if forward {
                    target.vote_weight += earned.total();
                } else {
                    target.vote_weight = target.vote_weight.saturating_sub(earned.total());
                }
                store.set_account(target)?;
            }
        }

        Ok(())
    }

    /// Forger lists and snapshots older than the retention horizon can no
    /// longer be reached by any verification or rollback path.
    fn prune_round_history<S: StateStore + ?Sized>(
        &self,
        round: Round,
        store: &mut S,
    ) -> Result<(), DposError> {
        let limit = round
            .saturating_sub(self.config.bft_round_offset + self.config.delegate_active_round_limit);
        if limit == 0 {
            return Ok(());
        }

        let forgers_list = storage::get_forgers_list(store)?;
        let kept: Vec<ForgersListEntry> = forgers_list
            .into_iter()
            .filter(|entry| entry.round >= limit)
            .collect();
        storage::set_forgers_list(store, kept)?;

        let vote_weights = storage::get_vote_weights(store)?;
        let kept: Vec<_> = vote_weights
            .into_iter()
            .filter(|entry| entry.round >= limit)
            .collect();
        storage::set_vote_weights(store, kept)?;

        debug!(round, limit, "pruned round history");
        Ok(())
    }
}
