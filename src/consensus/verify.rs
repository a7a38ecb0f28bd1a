// Forger verification - Slot assignment, seed-reveal compliance and
// active-delegate queries against stored forger lists and snapshots
use super::engine::DposEngine;
use super::forgers::sort_by_vote_weight;
use crate::error::DposError;
use crate::storage::{self, ChainDataAccess, ForgersListEntry, StateStore};
use crate::types::{stripped_hash, Address, BlockHeader, Height, Round};
use std::collections::BTreeMap;

/// Active membership in a forger list: listed in the forging order but not
/// as a standby member.
fn is_active_member(entry: &ForgersListEntry, address: &Address) -> bool {
    entry.delegates.contains(address) && !entry.standby.contains(address)
}

impl<C: ChainDataAccess> DposEngine<C> {
    /// Check that the block was forged by the delegate owning its time slot.
    pub fn verify_block_forger<S: StateStore + ?Sized>(
        &self,
        header: &BlockHeader,
        store: &S,
    ) -> Result<bool, DposError> {
        let round = self.rounds.calc_round(header.height);
        let entry = self.forgers_entry_for_round(round, store)?;
        if entry.delegates.is_empty() {
            return Err(DposError::NoForgersList { round });
        }

        let slot = self.slots.slot_number(header.timestamp);
        let expected = entry.delegates[slot as usize % entry.delegates.len()];
        let actual = header.generator_address();
        if expected != actual {
            return Err(DposError::ForgerMismatch {
                height: header.height,
                slot,
                expected,
                actual,
            });
        }
        Ok(true)
    }

    /// Seed-reveal compliance: the new reveal must be the preimage of the
    /// same generator's most recent reveal within the current and previous
    /// round. A generator with no prior block in that window is compliant
    /// by default (a fresh onion cannot be checked).
    pub fn is_dpos_protocol_compliant(
        &self,
        header: &BlockHeader,
        recent_headers: &[BlockHeader],
    ) -> bool {
        let round = self.rounds.calc_round(header.height);
        let generator = header.generator_address();

        let previous = recent_headers
            .iter()
            .filter(|h| h.height < header.height)
            .filter(|h| self.rounds.calc_round(h.height) + 1 >= round)
            .filter(|h| h.generator_address() == generator)
            .max_by_key(|h| h.height);

        match previous {
            None => true,
            Some(prev) => {
                let expected = stripped_hash(header.asset.seed_reveal.as_bytes());
                expected.as_bytes() == prev.asset.seed_reveal.as_bytes()
            }
        }
    }

    /// Whether `address` ranks inside the active set of the vote-weight
    /// snapshot governing `height`'s round.
    pub fn is_active_delegate<S: StateStore + ?Sized>(
        &self,
        address: &Address,
        height: Height,
        store: &S,
    ) -> Result<bool, DposError> {
        let round = self.rounds.calc_round(height);
        let vote_weights = storage::get_vote_weights(store)?;
        let snapshot = vote_weights
            .iter()
            .find(|entry| entry.round == round)
            .ok_or(DposError::VoteWeightNotFound { round })?;

        let mut ranked = snapshot.delegates.clone();
        sort_by_vote_weight(&mut ranked);
        Ok(ranked
            .iter()
            .take(self.config().active_delegates as usize)
            .any(|delegate| delegate.address == *address))
    }

    /// Whether `address` entered `height`'s round through the standby lottery
    pub fn is_standby_delegate<S: StateStore + ?Sized>(
        &self,
        address: &Address,
        height: Height,
        store: &S,
    ) -> Result<bool, DposError> {
        let round = self.rounds.calc_round(height);
        let entry = self.forgers_entry_for_round(round, store)?;
        Ok(entry.standby.contains(address))
    }

    /// Forging order of `round`, exactly as stored
    pub fn get_forger_addresses_for_round<S: StateStore + ?Sized>(
        &self,
        round: Round,
        store: &S,
    ) -> Result<Vec<Address>, DposError> {
        self.forgers_entry_for_round(round, store)
            .map(|entry| entry.delegates)
    }

    /// For each delegate active in one of the last `number_of_rounds` rounds,
    /// the start heights of its activity streaks. A streak extends backwards
    /// through consecutive rounds of active membership and spans at most
    /// `delegate_active_round_limit` rounds.
    pub fn get_min_active_heights_of_delegates<S: StateStore + ?Sized>(
        &self,
        height: Height,
        number_of_rounds: Round,
        store: &S,
    ) -> Result<BTreeMap<Address, Vec<Height>>, DposError> {
        let forgers_list = storage::get_forgers_list(store)?;
        if forgers_list.is_empty() {
            return Err(DposError::NoForgersListHistory);
        }

        let current_round = self.rounds.calc_round(height);
        if number_of_rounds > current_round {
            return Err(DposError::TooManyRoundsRequested {
                requested: number_of_rounds,
                available: current_round,
            });
        }

        let by_round: BTreeMap<Round, &ForgersListEntry> = forgers_list
            .iter()
            .map(|entry| (entry.round, entry))
            .collect();
        let streak_limit = self.config().delegate_active_round_limit;

        let mut result: BTreeMap<Address, Vec<Height>> = BTreeMap::new();
        let first_round = current_round + 1 - number_of_rounds;
        for target in (first_round..=current_round).rev() {
            let Some(entry) = by_round.get(&target) else {
                continue;
            };
            for address in &entry.delegates {
                if entry.standby.contains(address) {
                    continue;
                }

                let mut streak_start = target;
                for step in 1..streak_limit {
                    let Some(earlier) = target.checked_sub(step) else {
                        break;
                    };
                    if earlier == 0 {
                        break;
                    }
                    match by_round.get(&earlier) {
                        Some(previous) if is_active_member(previous, address) => {
                            streak_start = earlier;
                        }
                        _ => break,
                    }
                }

                let min_height = self.rounds.calc_round_start_height(streak_start);
                let heights = result.entry(*address).or_default();
                if heights.last() != Some(&min_height) {
                    heights.push(min_height);
                }
            }
        }

        Ok(result)
    }

    /// Start height of `address`'s current activity streak
    pub fn get_min_active_height<S: StateStore + ?Sized>(
        &self,
        height: Height,
        address: &Address,
        store: &S,
    ) -> Result<Height, DposError> {
        let heights = self.get_min_active_heights_of_delegates(height, 1, store)?;
        heights
            .get(address)
            .and_then(|streaks| streaks.first())
            .copied()
            .ok_or(DposError::DelegateNotActive { address: *address })
    }
}
