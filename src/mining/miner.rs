//! Mining engine
//!
//! Blocks are immutable, so nonce search runs on a [`BlockCandidate`]: a
//! mutable header plus its transactions. Once a nonce solves the target the
//! candidate is sealed into a [`Block`].

use crate::config::MiningConfig;
use crate::core::block::{Block, BlockError, BlockHeader};
use crate::core::blockchain::Blockchain;
use crate::core::consensus::ConsensusRules;
use crate::core::transaction::Transaction;
use crate::crypto::{leaf_count, Address, Hash256, KeyPair, MerkleError, Secp256k1Signer};
use log::{debug, info};
use std::time::Instant;

/// Nonce attempts between progress log lines
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// A block under construction; only the nonce changes during search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCandidate {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl BlockCandidate {
    pub fn new(
        version: u32,
        height: u32,
        prev_block_hash: Hash256,
        difficulty_target: u32,
        transactions: Vec<Transaction>,
    ) -> Result<Self, MerkleError> {
        let merkle_root = Block::calculate_merkle_root(&transactions)?;
        let tx_count = leaf_count(transactions.len())?;
        let header = BlockHeader {
            version,
            height,
            prev_block_hash,
            difficulty_target,
            tx_count,
            merkle_root,
            nonce: 0,
        };
        Ok(Self {
            header,
            transactions,
        })
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn nonce(&self) -> u32 {
        self.header.nonce
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        self.header.nonce = nonce;
    }

    pub fn set_difficulty_target(&mut self, difficulty_target: u32) {
        self.header.difficulty_target = difficulty_target;
    }

    /// Header hash at the current nonce
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Freeze into an immutable block
    pub fn seal(self) -> Block {
        Block::from_parts(self.header, self.transactions)
    }
}

/// Miner for creating new blocks
pub struct Miner {
    keypair: KeyPair,
    signer: Secp256k1Signer,
    config: MiningConfig,
}

impl Miner {
    /// Create a miner paying rewards to `keypair`
    pub fn new(keypair: KeyPair, config: MiningConfig) -> Self {
        Self {
            keypair,
            signer: Secp256k1Signer::new(),
            config,
        }
    }

    /// Address receiving block rewards and fees
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Candidate on top of the chain tip: coinbase first, then `transactions`
    pub fn next_candidate(
        &self,
        blockchain: &Blockchain,
        transactions: Vec<Transaction>,
    ) -> Result<BlockCandidate, BlockError> {
        let height = blockchain.len() as u32;

        // sequence is the height so every reward claim hashes differently
        let coinbase =
            Transaction::coinbase(&self.keypair, height, self.config.block_reward, &self.signer)?;

        let mut all_transactions = Vec::with_capacity(transactions.len() + 1);
        all_transactions.push(coinbase);
        all_transactions.extend(transactions);

        Ok(BlockCandidate::new(
            self.config.version,
            height,
            blockchain.hash(),
            blockchain.current_difficulty(),
            all_transactions,
        )?)
    }

    /// Search nonces from the candidate's current one until the header is
    /// solved, giving up after `max_attempts`
    pub fn mine(
        &self,
        mut candidate: BlockCandidate,
        engine: &impl ConsensusRules,
    ) -> Option<(Block, MiningStats)> {
        let start = Instant::now();
        let first_nonce = candidate.nonce();
        let budget = self.config.max_attempts.min(1 << 32);

        info!(
            "Mining block {} with target {:08x}...",
            candidate.header().height,
            candidate.header().difficulty_target
        );

        let mut attempts = 0u64;
        while attempts < budget {
            candidate.set_nonce(first_nonce.wrapping_add(attempts as u32));
            attempts += 1;

            if engine.is_header_solved(candidate.header()) {
                let stats = Self::stats(attempts, start);
                info!(
                    "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
                    candidate.header().height,
                    stats.time_ms,
                    attempts,
                    stats.hash_rate
                );
                return Some((candidate.seal(), stats));
            }

            if attempts % PROGRESS_INTERVAL == 0 {
                debug!("{} nonces tried", attempts);
            }
        }

        info!(
            "Gave up on block {} after {} attempts",
            candidate.header().height,
            attempts
        );
        None
    }

    fn stats(attempts: u64, start: Instant) -> MiningStats {
        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            attempts as f64
        };

        MiningStats {
            hash_attempts: attempts,
            time_ms: elapsed,
            hash_rate,
        }
    }
}
