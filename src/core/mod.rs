//! Core ledger components
//!
//! This module contains the validation engine:
//! - Binary codec for transactions and blocks
//! - Transactions and immutable blocks
//! - Blockchain (ordered block sequence)
//! - Consensus engine (proof of work, size limit)
//! - Transaction verifier (signatures)
//! - Journaled balance cache
//! - Chain validator
//! - Reorg resolver

pub mod balance;
pub mod block;
pub mod blockchain;
pub mod codec;
pub mod consensus;
pub mod reorg;
pub mod transaction;
pub mod validator;
pub mod verifier;

pub use balance::{Balance, BalanceCache, BalanceError, JournalEntry, Snapshot};
pub use block::{
    Block, BlockError, BlockHeader, BLOCK_FIXED_SIZE, BLOCK_HEADER_SIZE, BLOCK_VERSION,
    INITIAL_DIFFICULTY_TARGET,
};
pub use blockchain::Blockchain;
pub use codec::{ByteReader, Decode, DecodeError, Encode};
pub use consensus::{ConsensusEngine, ConsensusRules, MAX_BLOCK_SIZE};
pub use reorg::{
    BlockFetcher, FetchError, FetchedBlock, ReorgError, ReorgResolver, PRE_GENESIS_HASH,
};
pub use transaction::{Destination, Transaction, MIN_TRANSACTION_SIZE};
pub use validator::{
    ChainValidationError, ChainValidator, RuleViolation, TransactionFailure, ValidatorState,
};
pub use verifier::{SignatureVerifier, TransactionVerifier};
