// Block - Header view consumed by the consensus engine
use super::primitives::{Address, Balance, Hash32, Height, PublicKey, SeedReveal, Timestamp};
use serde::{Deserialize, Serialize};

/// Consensus-relevant asset carried in every block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderAsset {
    /// Preimage commitment for the seed-reveal chain
    pub seed_reveal: SeedReveal,
}

/// Immutable block header. The engine reads headers but never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: Hash32,
    pub height: Height,
    pub timestamp: Timestamp,
    pub generator_public_key: PublicKey,
    pub reward: Balance,
    pub total_fee: Balance,
    pub asset: BlockHeaderAsset,
}

impl BlockHeader {
    pub fn generator_address(&self) -> Address {
        self.generator_public_key.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_address_matches_key_derivation() {
        let key = PublicKey::from_bytes([3; 32]);
        let header = BlockHeader {
            id: Hash32::hash(b"block"),
            height: 42,
            timestamp: 1_650_000_000,
            generator_public_key: key,
            reward: 0,
            total_fee: 0,
            asset: BlockHeaderAsset {
                seed_reveal: SeedReveal::from_bytes([0; 16]),
            },
        };
        assert_eq!(header.generator_address(), key.address());
    }
}
