// Consensus - DPoS round machinery
pub mod engine;
pub mod forgers;
pub mod random_seed;
pub mod rounds;
pub mod verify;
pub mod vote_weight;
