// Vote weight snapshot - Ranking computed at round boundaries that seeds
// forger selection several rounds ahead
use super::forgers::sort_by_vote_weight;
use super::rounds::Rounds;
use crate::config::DposConfig;
use crate::error::DposError;
use crate::storage::{self, DelegateVoteWeight, StateStore, VoteWeightsEntry};
use crate::types::{Account, Height, Round};
use tracing::debug;

/// Round a snapshot taken at `height` (last block of its round) governs:
/// two rounds ahead plus the configured lookahead, so the forger list for
/// that round is computable one boundary before the round starts.
pub fn snapshot_round_for_height(
    config: &DposConfig,
    rounds: &Rounds,
    height: Height,
) -> Round {
    rounds.calc_round(height + 1) + 1 + config.delegate_list_round_offset
}

fn is_eligible(account: &Account, height: Height, config: &DposConfig) -> bool {
    !account.is_banned
        && !account.is_currently_punished(height, config.punishment_window)
        && account.self_votes()
}

/// Compute and persist the vote-weight snapshot for the round derived from
/// `height`. Candidates are the registered delegates; banned, punished and
/// non-self-voting delegates only ever appear as zero-weight fillers.
pub fn create_vote_weight_snapshot<S: StateStore + ?Sized>(
    config: &DposConfig,
    rounds: &Rounds,
    height: Height,
    store: &mut S,
) -> Result<VoteWeightsEntry, DposError> {
    let registered = storage::get_registered_delegates(store)?;

    let mut ranked: Vec<(Account, bool)> = Vec::with_capacity(registered.len());
    for delegate in &registered {
        let Some(account) = store.get_account(&delegate.address)? else {
            continue;
        };
        let eligible = is_eligible(&account, height, config);
        ranked.push((account, eligible));
    }

    ranked.sort_by(|(a, _), (b, _)| {
        b.vote_weight
            .cmp(&a.vote_weight)
            .then_with(|| a.address.cmp(&b.address))
    });

    let target = config.snapshot_target();
    let qualifying: Vec<DelegateVoteWeight> = ranked
        .iter()
        .filter(|(account, eligible)| *eligible && account.vote_weight > config.standby_threshold)
        .map(|(account, _)| DelegateVoteWeight {
            address: account.address,
            vote_weight: account.vote_weight,
        })
        .collect();

    let delegates = if qualifying.len() >= target {
        // every threshold-qualifying delegate participates; the snapshot
        // may exceed the target size
        qualifying
    } else {
        // pad in rank order; ineligible delegates are represented with
        // zero weight so the active slot count stays meaningful
        ranked
            .iter()
            .take(target)
            .map(|(account, eligible)| DelegateVoteWeight {
                address: account.address,
                vote_weight: if *eligible { account.vote_weight } else { 0 },
            })
            .collect()
    };

    let round = snapshot_round_for_height(config, rounds, height);
    let entry = VoteWeightsEntry { round, delegates };

    let mut vote_weights = storage::get_vote_weights(store)?;
    vote_weights.retain(|existing| existing.round != round);
    vote_weights.push(entry.clone());
    storage::set_vote_weights(store, vote_weights)?;

    debug!(
        height,
        round,
        delegates = entry.delegates.len(),
        "stored vote weight snapshot"
    );

    Ok(entry)
}

/// Genesis bootstrap: seed the snapshot consumed at the first round
/// boundary directly from the initial delegate accounts. There is no vote
/// history yet, so eligibility filtering does not apply.
pub fn create_genesis_vote_weight_snapshot<S: StateStore + ?Sized>(
    config: &DposConfig,
    accounts: &[Account],
    store: &mut S,
) -> Result<VoteWeightsEntry, DposError> {
    let mut delegates: Vec<DelegateVoteWeight> = accounts
        .iter()
        .map(|account| DelegateVoteWeight {
            address: account.address,
            vote_weight: account.vote_weight,
        })
        .collect();
    sort_by_vote_weight(&mut delegates);

    let round = config.delegate_list_round_offset + 2;
    let entry = VoteWeightsEntry { round, delegates };

    let mut vote_weights = storage::get_vote_weights(store)?;
    vote_weights.retain(|existing| existing.round != round);
    vote_weights.push(entry.clone());
    storage::set_vote_weights(store, vote_weights)?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemStateStore, RegisteredDelegate};
    use crate::types::{Address, Balance, PublicKey, Vote, UNIT};

    fn delegate(seed: u8, vote_weight: Balance) -> Account {
        let key = PublicKey::from_bytes([seed; 32]);
        let mut account = Account::new(key.address(), key);
        account.username = format!("delegate_{seed}");
        account.vote_weight = vote_weight;
        account.sent_votes.push(Vote {
            delegate_address: account.address,
            amount: 10 * UNIT,
        });
        account
    }

    fn setup(delegates: Vec<Account>) -> (MemStateStore, Vec<Address>) {
        let mut store = MemStateStore::new();
        let registered = delegates
            .iter()
            .map(|account| RegisteredDelegate {
                address: account.address,
                username: account.username.clone(),
            })
            .collect();
        storage::set_registered_delegates(&mut store, registered).unwrap();
        let addresses = delegates.iter().map(|a| a.address).collect();
        for account in delegates {
            store.insert_account(account);
        }
        (store, addresses)
    }

    fn small_config() -> DposConfig {
        DposConfig {
            active_delegates: 3,
            standby_delegates: 1,
            ..DposConfig::default()
        }
    }

    #[test]
    fn test_snapshot_round_lookahead() {
        let config = DposConfig::default();
        let rounds = Rounds::new(config.round_length());
        // end of round 1 -> snapshot for round 5 with the default offset 2
        assert_eq!(snapshot_round_for_height(&config, &rounds, 103), 5);
        assert_eq!(snapshot_round_for_height(&config, &rounds, 206), 6);
    }

    #[test]
    fn test_all_qualifying_kept_beyond_target() {
        let config = small_config(); // target = 4
        let rounds = Rounds::new(config.round_length());
        let delegates: Vec<Account> = (1..=6)
            .map(|seed| delegate(seed, (2000 + seed as Balance) * UNIT))
            .collect();
        let (mut store, _) = setup(delegates);

        let entry = create_vote_weight_snapshot(&config, &rounds, 4, &mut store).unwrap();
        // all six clear the threshold, snapshot is larger than the target
        assert_eq!(entry.delegates.len(), 6);
        assert!(entry.delegates.iter().all(|d| d.vote_weight > 0));
    }

    #[test]
    fn test_padding_with_zero_weight_fillers() {
        let config = small_config();
        let rounds = Rounds::new(config.round_length());

        let mut punished = delegate(3, 5000 * UNIT);
        punished.pom_heights.push(1);
        let mut banned = delegate(4, 4000 * UNIT);
        banned.is_banned = true;
        let delegates = vec![
            delegate(1, 3000 * UNIT),
            delegate(2, 500 * UNIT),
            punished,
            banned,
            delegate(5, 0),
        ];
        let (mut store, _) = setup(delegates);

        let entry = create_vote_weight_snapshot(&config, &rounds, 4, &mut store).unwrap();
        // only delegate 1 qualifies; padded to the target of 4 in rank order
        assert_eq!(entry.delegates.len(), 4);

        let by_addr = |seed: u8| {
            let addr = PublicKey::from_bytes([seed; 32]).address();
            entry.delegates.iter().find(|d| d.address == addr).cloned()
        };
        assert_eq!(by_addr(1).unwrap().vote_weight, 3000 * UNIT);
        // punished and banned delegates are represented with zero weight
        assert_eq!(by_addr(3).unwrap().vote_weight, 0);
        assert_eq!(by_addr(4).unwrap().vote_weight, 0);
        // low-weight but eligible filler keeps its weight
        assert_eq!(by_addr(2).unwrap().vote_weight, 500 * UNIT);
    }

    #[test]
    fn test_non_self_voting_delegate_excluded_from_qualifying() {
        let config = small_config();
        let rounds = Rounds::new(config.round_length());

        let mut no_self_vote = delegate(1, 9000 * UNIT);
        no_self_vote.sent_votes.clear();
        let delegates = vec![
            no_self_vote,
            delegate(2, 2000 * UNIT),
            delegate(3, 2000 * UNIT),
            delegate(4, 2000 * UNIT),
            delegate(5, 2000 * UNIT),
        ];
        let (mut store, _) = setup(delegates);

        let entry = create_vote_weight_snapshot(&config, &rounds, 4, &mut store).unwrap();
        // four qualifying delegates fill the target exactly; the richest
        // delegate is excluded for not voting for itself
        assert_eq!(entry.delegates.len(), 4);
        let excluded = PublicKey::from_bytes([1; 32]).address();
        assert!(entry.delegates.iter().all(|d| d.address != excluded));
    }

    #[test]
    fn test_punishment_expires() {
        let config = small_config();
        let mut account = delegate(1, 5000 * UNIT);
        account.pom_heights.push(10);

        assert!(!is_eligible(&account, 9 + config.punishment_window, &config));
        // the window is measured from the latest PoM height
        assert!(is_eligible(&account, 10 + config.punishment_window, &config));
    }

    #[test]
    fn test_genesis_snapshot_round_and_order() {
        let config = small_config();
        let accounts = vec![delegate(2, 100), delegate(1, 300), delegate(3, 200)];
        let mut store = MemStateStore::new();

        let entry =
            create_genesis_vote_weight_snapshot(&config, &accounts, &mut store).unwrap();
        assert_eq!(entry.round, 4);
        assert_eq!(entry.delegates[0].vote_weight, 300);
        assert_eq!(entry.delegates[2].vote_weight, 100);
    }
}
