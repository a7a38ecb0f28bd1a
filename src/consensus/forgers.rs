// Forger list selection - Active set by rank, standby by weighted lottery,
// forging order by deterministic shuffle
use super::rounds::Rounds;
use crate::config::DposConfig;
use crate::error::DposError;
use crate::storage::{
    self, DelegateVoteWeight, ForgersListEntry, StateStore,
};
use crate::types::{stripped_hash, Address, Balance, RandomSeed, Round};
use tracing::debug;

/// Weighting function for the standby lottery. The precise formula is a
/// protocol parameter; implementations must only preserve the draw
/// contract (without replacement, one seed per slot, positive weights).
pub trait StandbyWeighting {
    fn draw_weight(&self, candidate: &DelegateVoteWeight, total_weight: Balance) -> Balance;
}

/// Default weighting: a candidate's draw weight is capped at
/// `total_weight / cap_rate` so no single candidate dominates the lottery.
#[derive(Debug, Clone, Copy)]
pub struct CappedWeighting {
    pub cap_rate: u64,
}

impl StandbyWeighting for CappedWeighting {
    fn draw_weight(&self, candidate: &DelegateVoteWeight, total_weight: Balance) -> Balance {
        if self.cap_rate == 0 {
            return candidate.vote_weight;
        }
        candidate.vote_weight.min(total_weight / Balance::from(self.cap_rate))
    }
}

/// Canonical snapshot ordering: vote weight descending, address ascending.
/// The address tie-break is load-bearing; vote weights collide in practice.
pub fn sort_by_vote_weight(delegates: &mut [DelegateVoteWeight]) {
    delegates.sort_by(|a, b| {
        b.vote_weight
            .cmp(&a.vote_weight)
            .then_with(|| a.address.cmp(&b.address))
    });
}

/// One weighted draw without replacement. Walks the cumulative weight line
/// and removes the candidate the seed points at.
fn pick_standby_delegate(
    candidates: &mut Vec<DelegateVoteWeight>,
    seed: &RandomSeed,
    weighting: &dyn StandbyWeighting,
) -> Option<Address> {
    let raw_total: Balance = candidates.iter().map(|c| c.vote_weight).sum();
    if raw_total == 0 {
        return None;
    }

    let total_draw_weight: Balance = candidates
        .iter()
        .map(|c| weighting.draw_weight(c, raw_total))
        .sum();
    if total_draw_weight == 0 {
        return None;
    }

    let mut threshold = Balance::from(seed.as_u64_be()) % total_draw_weight;
    for index in 0..candidates.len() {
        let weight = weighting.draw_weight(&candidates[index], raw_total);
        if threshold < weight {
            return Some(candidates.remove(index).address);
        }
        threshold -= weight;
    }

    // cumulative walk covers total_draw_weight exactly
    None
}

/// Deterministic permutation keyed by a hash stream: hash the running state,
/// pick-and-remove the indexed element, repeat. Uniform over permutations,
/// unlike a sort by random key.
pub fn shuffle_delegate_list(seed: &RandomSeed, addresses: &[Address]) -> Vec<Address> {
    let mut pool = addresses.to_vec();
    let mut shuffled = Vec::with_capacity(pool.len());
    let mut state = *blake3::hash(seed.as_bytes()).as_bytes();

    while !pool.is_empty() {
        state = *blake3::hash(&state).as_bytes();
        let mut word = [0u8; 8];
        word.copy_from_slice(&state[..8]);
        let index = (u64::from_be_bytes(word) % pool.len() as u64) as usize;
        shuffled.push(pool.remove(index));
    }

    shuffled
}

/// Shuffle seed for round `round`: derived from the previous round's end
/// height, deliberately independent of the two lottery seeds.
pub fn shuffle_seed_for_round(rounds: &Rounds, round: Round) -> RandomSeed {
    let previous_end = rounds.calc_round_end_height(round.saturating_sub(1));
    stripped_hash(&previous_end.to_be_bytes())
}

/// Compute and persist the forger list for `round` from its vote-weight
/// snapshot and the two random seeds of the closing round.
pub fn update_forgers_list<S: StateStore + ?Sized>(
    config: &DposConfig,
    rounds: &Rounds,
    round: Round,
    seeds: &[RandomSeed; 2],
    weighting: &dyn StandbyWeighting,
    store: &mut S,
) -> Result<ForgersListEntry, DposError> {
    let vote_weights = storage::get_vote_weights(store)?;
    let snapshot = vote_weights
        .iter()
        .find(|entry| entry.round == round)
        .ok_or(DposError::NoVoteWeightSnapshot { round })?;

    let mut ranked = snapshot.delegates.clone();
    sort_by_vote_weight(&mut ranked);

    let active_count = (config.active_delegates as usize).min(ranked.len());
    let active: Vec<Address> = ranked[..active_count].iter().map(|d| d.address).collect();

    let mut candidates: Vec<DelegateVoteWeight> = ranked[active_count..]
        .iter()
        .filter(|d| d.vote_weight > 0)
        .cloned()
        .collect();

    let mut standby = Vec::new();
    for slot in 0..config.standby_delegates as usize {
        let seed = &seeds[slot % seeds.len()];
        match pick_standby_delegate(&mut candidates, seed, weighting) {
            Some(address) => standby.push(address),
            None => break,
        }
    }

    let mut pool = active;
    pool.extend(standby.iter().copied());

    let shuffle_seed = shuffle_seed_for_round(rounds, round);
    let delegates = shuffle_delegate_list(&shuffle_seed, &pool);

    debug!(
        round,
        delegates = delegates.len(),
        standby = standby.len(),
        "computed forger list"
    );

    let entry = ForgersListEntry {
        round,
        delegates,
        standby,
    };

    let mut forgers_list = storage::get_forgers_list(store)?;
    if forgers_list.iter().any(|existing| existing.round == round) {
        return Err(DposError::DuplicateForgersList { round });
    }
    forgers_list.push(entry.clone());
    storage::set_forgers_list(store, forgers_list)?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemStateStore, VoteWeightsEntry};
    use crate::types::{PublicKey, UNIT};
    use std::collections::BTreeSet;

    fn addr(seed: u8) -> Address {
        PublicKey::from_bytes([seed; 32]).address()
    }

    fn weights(entries: &[(u8, Balance)]) -> Vec<DelegateVoteWeight> {
        entries
            .iter()
            .map(|(seed, weight)| DelegateVoteWeight {
                address: addr(*seed),
                vote_weight: *weight,
            })
            .collect()
    }

    fn small_config() -> DposConfig {
        DposConfig {
            active_delegates: 3,
            standby_delegates: 2,
            ..DposConfig::default()
        }
    }

    fn store_with_snapshot(round: Round, delegates: Vec<DelegateVoteWeight>) -> MemStateStore {
        let mut store = MemStateStore::new();
        storage::set_vote_weights(&mut store, vec![VoteWeightsEntry { round, delegates }])
            .unwrap();
        store
    }

    #[test]
    fn test_sort_ties_break_by_address() {
        let mut delegates = weights(&[(2, 10), (1, 10), (3, 20)]);
        sort_by_vote_weight(&mut delegates);
        assert_eq!(delegates[0].address, addr(3));
        // equal weights: ascending address order
        let tie: Vec<Address> = delegates[1..].iter().map(|d| d.address).collect();
        let mut expected = vec![addr(1), addr(2)];
        expected.sort();
        assert_eq!(tie, expected);
    }

    #[test]
    fn test_shuffle_is_deterministic_permutation() {
        let addresses: Vec<Address> = (1..=20).map(addr).collect();
        let seed = RandomSeed::from_bytes([5; 16]);

        let a = shuffle_delegate_list(&seed, &addresses);
        let b = shuffle_delegate_list(&seed, &addresses);
        assert_eq!(a, b);

        let as_set: BTreeSet<Address> = a.iter().copied().collect();
        let original: BTreeSet<Address> = addresses.iter().copied().collect();
        assert_eq!(as_set, original);

        let other = shuffle_delegate_list(&RandomSeed::from_bytes([6; 16]), &addresses);
        assert_ne!(a, other);
    }

    #[test]
    fn test_missing_snapshot_is_fatal() {
        let mut store = MemStateStore::new();
        let seeds = [RandomSeed::from_bytes([1; 16]), RandomSeed::from_bytes([2; 16])];
        let err = update_forgers_list(
            &small_config(),
            &Rounds::new(5),
            9,
            &seeds,
            &CappedWeighting { cap_rate: 10 },
            &mut store,
        )
        .unwrap_err();
        assert!(matches!(err, DposError::NoVoteWeightSnapshot { round: 9 }));
    }

    #[test]
    fn test_standby_selected_from_non_active_pool() {
        let config = small_config();
        let delegates = weights(&[
            (1, 100 * UNIT),
            (2, 90 * UNIT),
            (3, 80 * UNIT),
            (4, 10 * UNIT),
            (5, 5 * UNIT),
            (6, 1 * UNIT),
        ]);
        let mut store = store_with_snapshot(4, delegates);
        let seeds = [RandomSeed::from_bytes([7; 16]), RandomSeed::from_bytes([9; 16])];

        let entry = update_forgers_list(
            &config,
            &Rounds::new(5),
            4,
            &seeds,
            &CappedWeighting { cap_rate: 10 },
            &mut store,
        )
        .unwrap();

        assert_eq!(entry.round, 4);
        assert_eq!(entry.delegates.len(), 5);
        assert_eq!(entry.standby.len(), 2);

        // standby members come from outside the top ranks
        let active_ranks: BTreeSet<Address> = [addr(1), addr(2), addr(3)].into_iter().collect();
        for member in &entry.standby {
            assert!(!active_ranks.contains(member));
            assert!(entry.delegates.contains(member));
        }

        // no duplicates in the forging order
        let unique: BTreeSet<Address> = entry.delegates.iter().copied().collect();
        assert_eq!(unique.len(), entry.delegates.len());
    }

    #[test]
    fn test_fewer_standby_when_candidates_lack_weight() {
        let config = small_config();
        // only one candidate outside the active set has positive weight
        let delegates = weights(&[(1, 50), (2, 40), (3, 30), (4, 20), (5, 0)]);
        let mut store = store_with_snapshot(2, delegates);
        let seeds = [RandomSeed::from_bytes([1; 16]), RandomSeed::from_bytes([2; 16])];

        let entry = update_forgers_list(
            &config,
            &Rounds::new(5),
            2,
            &seeds,
            &CappedWeighting { cap_rate: 10 },
            &mut store,
        )
        .unwrap();

        assert_eq!(entry.standby, vec![addr(4)]);
        assert_eq!(entry.delegates.len(), 4);
    }

    #[test]
    fn test_duplicate_round_rejected() {
        let config = small_config();
        let mut store = store_with_snapshot(2, weights(&[(1, 50), (2, 40)]));
        let seeds = [RandomSeed::from_bytes([1; 16]), RandomSeed::from_bytes([2; 16])];

        update_forgers_list(
            &config,
            &Rounds::new(5),
            2,
            &seeds,
            &CappedWeighting { cap_rate: 10 },
            &mut store,
        )
        .unwrap();

        let err = update_forgers_list(
            &config,
            &Rounds::new(5),
            2,
            &seeds,
            &CappedWeighting { cap_rate: 10 },
            &mut store,
        )
        .unwrap_err();
        assert!(matches!(err, DposError::DuplicateForgersList { round: 2 }));
    }

    #[test]
    fn test_capped_weighting_limits_dominance() {
        let weighting = CappedWeighting { cap_rate: 10 };
        let whale = DelegateVoteWeight {
            address: addr(1),
            vote_weight: 1_000_000,
        };
        assert_eq!(weighting.draw_weight(&whale, 1_000_000), 100_000);

        let minnow = DelegateVoteWeight {
            address: addr(2),
            vote_weight: 50_000,
        };
        assert_eq!(weighting.draw_weight(&minnow, 1_000_000), 50_000);
    }
}
