// Tidemark - Delegated Proof-of-Stake consensus engine
// Principle: Deterministic everywhere. Every node must reach the same
// forger list, the same payouts and the same verdicts from the same chain.

pub mod config;
pub mod consensus;
pub mod error;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{DposConfig, RoundException};
pub use consensus::engine::{DposEngine, RoundChangeEvent};
pub use error::DposError;
