//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::{Mempool, DEFAULT_MEMPOOL_SIZE};
pub use miner::{BlockCandidate, Miner, MiningStats};
