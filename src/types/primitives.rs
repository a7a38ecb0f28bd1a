// Primitives - Fundamental types of the DPoS engine
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height (1-based; height 1 is the genesis block)
pub type Height = u64;

/// Round number (1-based; a round spans `blocks_per_round` heights)
pub type Round = u64;

/// Time slot number, derived from a block timestamp
pub type Slot = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Balance and vote weight in base units (u128 = enough for centuries)
pub type Balance = u128;

/// Base-unit scale: 1 token = 10^8 units
pub const UNIT: Balance = 100_000_000;

/// Delegate address (20 bytes, derived from the public key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const LENGTH: usize = 20;

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Address = first 20 bytes of blake3(public key)
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = blake3::hash(key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

/// Ed25519 public key bytes of a block generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Universal 32-byte hash (blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash32(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hash(data: &[u8]) -> Self {
        Hash32(*blake3::hash(data).as_bytes())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Per-block seed-reveal commitment (16 bytes).
/// Each block's reveal must be the blake3 preimage (stripped to 16 bytes)
/// of the same delegate's previous reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedReveal([u8; 16]);

impl SeedReveal {
    pub const LENGTH: usize = 16;

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        SeedReveal(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for SeedReveal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Per-round random seed (16 bytes), XOR-combinable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomSeed([u8; 16]);

impl RandomSeed {
    pub const LENGTH: usize = 16;

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        RandomSeed(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn xor(&self, other: &RandomSeed) -> RandomSeed {
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        RandomSeed(out)
    }

    /// First 8 bytes as a big-endian integer, for weighted draws
    pub fn as_u64_be(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl fmt::Display for RandomSeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// First 16 bytes of blake3(data). The truncated form is what the
/// seed-reveal chain and the random-seed derivation both operate on.
pub fn stripped_hash(data: &[u8]) -> RandomSeed {
    let digest = blake3::hash(data);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    RandomSeed(bytes)
}
