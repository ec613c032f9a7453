//! Edu-Ledger: an educational permissionless ledger in Rust
//!
//! This crate provides the ledger validation engine featuring:
//! - Bit-exact big-endian wire format for transactions and blocks
//! - Proof of Work consensus with a block size limit
//! - ECDSA recoverable signatures (secp256k1)
//! - Account balances with a journaled snapshot/revert cache
//! - Merkle tree transaction commitment
//! - Chain reorganization against a peer's chain
//! - Nonce search and a transaction mempool
//! - An in-memory, async block store
//!
//! # Example
//!
//! ```rust
//! use edu_ledger::config::MiningConfig;
//! use edu_ledger::core::{Blockchain, ChainValidator, ConsensusEngine};
//! use edu_ledger::crypto::KeyPair;
//! use edu_ledger::mining::Miner;
//!
//! let mut blockchain = Blockchain::new();
//! let mut validator = ChainValidator::with_defaults();
//! let engine = ConsensusEngine::new();
//!
//! // Mine the genesis block
//! let miner = Miner::new(KeyPair::generate(), MiningConfig::default());
//! let candidate = miner.next_candidate(&blockchain, vec![]).unwrap();
//! let (block, stats) = miner.mine(candidate, &engine).unwrap();
//! println!("Mined block {} in {}ms", block.height(), stats.time_ms);
//!
//! // Validate and append it
//! validator.try_append_block(&mut blockchain, block).unwrap();
//! println!("Balance: {}", validator.balance(&miner.address()));
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod storage;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use core::{
    Block, Blockchain, ChainValidationError, ChainValidator, ConsensusEngine, ReorgResolver,
    Transaction,
};
pub use crypto::{Address, KeyPair};
pub use mining::{Mempool, Miner};
pub use storage::MemoryBlockStore;
