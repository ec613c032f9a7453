//! Chain validation
//!
//! The validator owns a [`BalanceCache`] that mirrors the effect of the
//! first `validated_length` blocks of the chain it is fed. Appending a
//! block first catches the cache up with any blocks it has not seen, then
//! checks the block's linkage, consensus rules and transactions. The
//! transaction pass runs under a journal snapshot, so a rejected block
//! leaves both the chain and the balances untouched.

use crate::core::balance::{Balance, BalanceCache, BalanceError};
use crate::core::block::Block;
use crate::core::blockchain::Blockchain;
use crate::core::consensus::{ConsensusEngine, ConsensusRules};
use crate::core::transaction::Transaction;
use crate::core::verifier::{SignatureVerifier, TransactionVerifier};
use crate::crypto::Address;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// A consensus or balance rule broken by a block or one of its transactions
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("previous block hash not correct")]
    PrevHashMismatch,
    #[error("block height out of order")]
    HeightOutOfOrder,
    #[error("invalid difficulty")]
    InvalidDifficulty,
    #[error("exceed size limit")]
    SizeExceeded,
    #[error("coinbase transaction not at the top")]
    CoinbaseNotAtTop,
    #[error("only one coinbase transaction is allowed")]
    MultipleCoinbase,
    #[error("block has no coinbase transaction")]
    MissingCoinbase,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("consensus rule violated")]
    ConsensusViolated,
    #[error("overspend: sender tried to send too much amount")]
    Overspend,
    #[error("balance overflow")]
    BalanceOverflow,
}

impl From<BalanceError> for RuleViolation {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::Overspend { .. } => RuleViolation::Overspend,
            BalanceError::Overflow { .. } => RuleViolation::BalanceOverflow,
        }
    }
}

/// A transaction that broke a rule, by position in its block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionFailure {
    pub index: usize,
    pub violation: RuleViolation,
}

/// The only error surfaced by chain validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainValidationError {
    /// Position of the offending block in the chain
    pub height: usize,
    /// Index of the offending transaction, if the failure is transaction-specific
    pub transaction_index: Option<usize>,
    /// Hex hash of the offending transaction
    pub transaction_hash: Option<String>,
    pub message: String,
}

impl fmt::Display for ChainValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: {}", self.height, self.message)?;
        if let Some(index) = self.transaction_index {
            write!(f, " (transaction {}", index)?;
            if let Some(hash) = &self.transaction_hash {
                write!(f, " {}", hash)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for ChainValidationError {}

impl ChainValidationError {
    /// A block-level failure
    pub fn block(height: usize, violation: RuleViolation) -> Self {
        Self {
            height,
            transaction_index: None,
            transaction_hash: None,
            message: violation.to_string(),
        }
    }

    /// A failure pinned to one transaction of `block`
    pub fn transaction(height: usize, block: &Block, failure: TransactionFailure) -> Self {
        Self {
            height,
            transaction_index: Some(failure.index),
            transaction_hash: block
                .transactions()
                .get(failure.index)
                .map(Transaction::hash_hex),
            message: failure.violation.to_string(),
        }
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Copy of the validator's mutable state, for handing state between owners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorState {
    cache: BalanceCache,
}

impl ValidatorState {
    pub fn validated_length(&self) -> usize {
        self.cache.validated_length()
    }
}

/// Validates blocks and chains against a journaled balance cache
#[derive(Debug, Clone)]
pub struct ChainValidator<V = SignatureVerifier, C = ConsensusEngine> {
    verifier: V,
    consensus: C,
    cache: BalanceCache,
}

impl ChainValidator<SignatureVerifier, ConsensusEngine> {
    /// Validator with secp256k1 signatures and the default consensus engine
    pub fn with_defaults() -> Self {
        Self::new(SignatureVerifier::new(), ConsensusEngine::new())
    }
}

impl<V: TransactionVerifier, C: ConsensusRules> ChainValidator<V, C> {
    pub fn new(verifier: V, consensus: C) -> Self {
        Self {
            verifier,
            consensus,
            cache: BalanceCache::new(),
        }
    }

    /// Consensus engine, for mining loops testing candidate nonces
    pub fn get_consensus_engine(&self) -> &C {
        &self.consensus
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Read-only view of the balance cache
    pub fn cache(&self) -> &BalanceCache {
        &self.cache
    }

    pub fn balance(&self, address: &Address) -> Balance {
        self.cache.get_balance(address)
    }

    pub fn validated_length(&self) -> usize {
        self.cache.validated_length()
    }

    /// Copy balances, journal and validated length together
    pub fn snapshot_state(&self) -> ValidatorState {
        ValidatorState {
            cache: self.cache.clone(),
        }
    }

    /// Replace balances, journal and validated length together
    pub fn restore_state(&mut self, state: ValidatorState) {
        self.cache = state.cache;
    }

    /// Validate `block` and append it to `blockchain`
    ///
    /// On failure neither the chain nor the balances change.
    pub fn try_append_block(
        &mut self,
        blockchain: &mut Blockchain,
        block: Block,
    ) -> Result<(), ChainValidationError> {
        if self.cache.validated_length() > blockchain.len() {
            warn!(
                "Balance cache covers {} blocks but chain has {}, revalidating from zero",
                self.cache.validated_length(),
                blockchain.len()
            );
            self.validate_entire_chain_from_zero(blockchain)?;
        } else if blockchain.len() > self.cache.validated_length() {
            self.validate_missing_chain(blockchain)?;
        }

        let height = blockchain.len();
        Self::check_linkage(blockchain.tip(), &block)
            .map_err(|violation| ChainValidationError::block(height, violation))?;
        self.validate_block(height, &block)?;

        info!(
            "Appended block {} ({} transactions) at height {}",
            block.hash_hex(),
            block.tx_count(),
            height
        );
        blockchain.push(block);
        self.cache.set_validated_length(blockchain.len());
        Ok(())
    }

    /// Validate every block from the validated length up to the chain tip
    ///
    /// Stops at the first invalid block; blocks validated before it stay
    /// validated.
    pub fn validate_missing_chain(
        &mut self,
        blockchain: &Blockchain,
    ) -> Result<(), ChainValidationError> {
        let start = self.cache.validated_length();
        for (height, block) in blockchain.blocks().iter().enumerate().skip(start) {
            let parent = height.checked_sub(1).and_then(|h| blockchain.get(h));
            Self::check_linkage(parent, block)
                .map_err(|violation| ChainValidationError::block(height, violation))?;

            self.validate_block(height, block)?;
            self.cache.set_validated_length(height + 1);
        }

        if blockchain.len() > start {
            debug!("Validated blocks {}..{}", start, blockchain.len());
        }
        Ok(())
    }

    /// Reset the balance cache and validate the whole chain
    pub fn validate_entire_chain_from_zero(
        &mut self,
        blockchain: &Blockchain,
    ) -> Result<(), ChainValidationError> {
        debug!("Resetting balance cache");
        self.cache.reset();
        self.validate_missing_chain(blockchain)
    }

    /// Block-level rules: proof of work, size and coinbase placement
    pub fn validate_block_consensus(&self, block: &Block) -> Result<(), RuleViolation> {
        if !self.consensus.is_solved(block) {
            return Err(RuleViolation::InvalidDifficulty);
        }

        if !self.consensus.is_size_ok(block) {
            return Err(RuleViolation::SizeExceeded);
        }

        let mut coinbase_count = 0;
        for (index, tx) in block.transactions().iter().enumerate() {
            if tx.is_coinbase() {
                if index != 0 {
                    return Err(RuleViolation::CoinbaseNotAtTop);
                }
                coinbase_count += 1;
            }
        }

        match coinbase_count {
            0 => Err(RuleViolation::MissingCoinbase),
            1 => Ok(()),
            _ => Err(RuleViolation::MultipleCoinbase),
        }
    }

    /// Apply the block's transactions to the balance cache in order
    ///
    /// Every mutation is journaled; callers take a snapshot first and revert
    /// to it on failure.
    pub fn validate_block_transactions(&mut self, block: &Block) -> Result<(), TransactionFailure> {
        let mut miner: Option<Address> = None;
        for (index, tx) in block.transactions().iter().enumerate() {
            self.apply_transaction(tx, &mut miner)
                .map_err(|violation| TransactionFailure { index, violation })?;
        }
        Ok(())
    }

    fn apply_transaction(
        &mut self,
        tx: &Transaction,
        miner: &mut Option<Address>,
    ) -> Result<(), RuleViolation> {
        if !self.verifier.verify_signature(tx) {
            return Err(RuleViolation::InvalidSignature);
        }

        if !self.verifier.verify_consensus(tx) {
            return Err(RuleViolation::ConsensusViolated);
        }

        if tx.is_coinbase() {
            let reward = tx
                .destinations()
                .first()
                .ok_or(RuleViolation::InvalidSignature)?;
            *miner = Some(*reward.address());

            // miner receives the block reward
            self.cache
                .add_balance(reward.address(), Balance::from(reward.amount()))?;
            return Ok(());
        }

        for destination in tx.destinations() {
            self.cache
                .add_balance(destination.address(), Balance::from(destination.amount()))?;
        }

        // miner receives the fee; without a coinbase the fee is burned
        if let Some(miner) = miner {
            self.cache.add_balance(miner, Balance::from(tx.fee()))?;
        }

        let debit = tx.total_sent() + Balance::from(tx.fee());
        self.cache.subtract_balance(tx.sender(), debit)?;
        Ok(())
    }

    /// Consensus check, then transactions under a snapshot
    fn validate_block(&mut self, height: usize, block: &Block) -> Result<(), ChainValidationError> {
        self.validate_block_consensus(block).map_err(|violation| {
            debug!("Block at height {} rejected: {}", height, violation);
            ChainValidationError::block(height, violation)
        })?;

        let snapshot = self.cache.take_snapshot();
        if let Err(failure) = self.validate_block_transactions(block) {
            self.cache.revert(snapshot);
            debug!(
                "Block at height {} rejected at transaction {}: {}",
                height, failure.index, failure.violation
            );
            return Err(ChainValidationError::transaction(height, block, failure));
        }
        Ok(())
    }

    /// Parent hash and height continuity; a block without parent must be genesis
    fn check_linkage(parent: Option<&Block>, block: &Block) -> Result<(), RuleViolation> {
        let Some(parent) = parent else {
            return if block.height() == 0 {
                Ok(())
            } else {
                Err(RuleViolation::HeightOutOfOrder)
            };
        };

        if block.prev_block_hash() != &parent.hash() {
            return Err(RuleViolation::PrevHashMismatch);
        }

        if parent.height().checked_add(1) != Some(block.height()) {
            return Err(RuleViolation::HeightOutOfOrder);
        }

        Ok(())
    }
}
