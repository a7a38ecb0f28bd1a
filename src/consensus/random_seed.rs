// Random seed derivation - Two per-round seeds from the seed-reveal chain
// Every node must derive identical seeds from identical chain history, so
// everything here is a pure fold over the supplied headers.
use super::rounds::Rounds;
use crate::types::{stripped_hash, Address, BlockHeader, Height, RandomSeed, Round};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RandomSeedError {
    #[error(
        "Random seed cannot be calculated before the middle of the round. \
         Current height: {height}"
    )]
    InsufficientHeaders { height: Height },
}

fn stripped_hash_of_u32(value: u32) -> RandomSeed {
    stripped_hash(&value.to_be_bytes())
}

/// Most recent earlier block of the same generator, searched down to
/// `search_till` (start of the generator's previous round).
fn previous_header_of_delegate<'a>(
    generator: Address,
    below_height: Height,
    search_till: Height,
    headers_by_height: &BTreeMap<Height, &'a BlockHeader>,
) -> Option<&'a BlockHeader> {
    headers_by_height
        .range(search_till..below_height)
        .rev()
        .map(|(_, header)| *header)
        .find(|header| header.generator_address() == generator)
}

/// Collect valid seed reveals for heights `to_height..=from_height`,
/// descending. A reveal is valid when its stripped hash equals the same
/// delegate's previous reveal; broken chains are skipped, not rejected.
fn select_seed_reveals(
    from_height: Height,
    to_height: Height,
    headers_by_height: &BTreeMap<Height, &BlockHeader>,
    rounds: &Rounds,
) -> Vec<RandomSeed> {
    let mut selected = Vec::new();

    for height in (to_height..=from_height).rev() {
        let Some(header) = headers_by_height.get(&height) else {
            continue;
        };

        let header_round = rounds.calc_round(header.height);
        let search_till = if header_round > 1 {
            rounds.calc_round_start_height(header_round - 1)
        } else {
            1
        };

        let Some(previous) = previous_header_of_delegate(
            header.generator_address(),
            height,
            search_till,
            headers_by_height,
        ) else {
            continue;
        };

        let expected = stripped_hash(header.asset.seed_reveal.as_bytes());
        if expected.as_bytes() != previous.asset.seed_reveal.as_bytes() {
            continue;
        }

        selected.push(RandomSeed::from_bytes(*header.asset.seed_reveal.as_bytes()));
    }

    selected
}

/// Derive the two random seeds governing round `round`'s standby lottery.
///
/// Seed 1 folds the validated reveals of the window ending at the middle of
/// `round`; seed 2 folds the window covering the round before last. The
/// caller must have observed the chain past the middle of `round`.
pub fn generate_random_seeds(
    round: Round,
    rounds: &Rounds,
    headers: &[BlockHeader],
) -> Result<[RandomSeed; 2], RandomSeedError> {
    let middle_threshold = rounds.blocks_per_round / 2;
    let last_height = headers.iter().map(|h| h.height).max().unwrap_or(0);
    let middle_of_round = rounds.calc_round_middle_height(round);

    if last_height < middle_of_round {
        return Err(RandomSeedError::InsufficientHeaders {
            height: last_height,
        });
    }

    if round == 1 {
        debug!(round, "returning bootstrap seeds for first round");
        let seed1 = stripped_hash_of_u32(middle_threshold as u32 + 1);
        let seed2 = stripped_hash_of_u32(0);
        return Ok([seed1, seed2]);
    }

    let start_of_last_round = rounds.calc_round_start_height(round - 1);
    let end_of_last_round = rounds.calc_round_end_height(round - 1);
    let start_of_second_last_round = if round > 2 {
        rounds.calc_round_start_height(round - 2)
    } else {
        1
    };

    let headers_by_height: BTreeMap<Height, &BlockHeader> =
        headers.iter().map(|header| (header.height, header)).collect();

    let reveals1 = select_seed_reveals(
        middle_of_round,
        start_of_last_round,
        &headers_by_height,
        rounds,
    );
    let reveals2 = select_seed_reveals(
        end_of_last_round,
        start_of_second_last_round,
        &headers_by_height,
        rounds,
    );

    let mut seed1 = stripped_hash_of_u32(middle_of_round as u32);
    for reveal in &reveals1 {
        seed1 = seed1.xor(reveal);
    }

    let mut seed2 = stripped_hash_of_u32(end_of_last_round as u32);
    for reveal in &reveals2 {
        seed2 = seed2.xor(reveal);
    }

    Ok([seed1, seed2])
}
