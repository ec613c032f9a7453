//! Block-level consensus rules: proof of work and size limit

use crate::config::ConsensusConfig;
use crate::core::block::{Block, BlockHeader};
use crate::crypto::{leading_score, Hash256};

/// Maximum storage size of a block in bytes
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Stateless block checks used by the validator and the mining loop
pub trait ConsensusRules {
    /// Whether the block hash meets its difficulty target
    fn is_solved(&self, block: &Block) -> bool;

    /// Whether the block's storage encoding fits the size limit
    fn is_size_ok(&self, block: &Block) -> bool;

    /// Proof-of-work check on a bare header, used while searching nonces
    fn is_header_solved(&self, header: &BlockHeader) -> bool {
        ConsensusEngine::meets_target(&header.hash(), header.difficulty_target)
    }
}

/// Default consensus engine
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    max_block_size: usize,
}

impl ConsensusEngine {
    pub fn new() -> Self {
        Self::with_config(&ConsensusConfig::default())
    }

    pub fn with_config(config: &ConsensusConfig) -> Self {
        Self {
            max_block_size: config.max_block_size,
        }
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// The score compared against the difficulty target: the first four
    /// bytes of the header hash, big-endian
    pub fn score(hash: &Hash256) -> u32 {
        leading_score(hash)
    }

    /// Proof-of-work check on a raw header hash
    pub fn meets_target(hash: &Hash256, difficulty_target: u32) -> bool {
        // a higher target makes production harder
        Self::score(hash) >= difficulty_target
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusRules for ConsensusEngine {
    fn is_solved(&self, block: &Block) -> bool {
        self.is_header_solved(block.header())
    }

    fn is_size_ok(&self, block: &Block) -> bool {
        block.size() <= self.max_block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BLOCK_VERSION;
    use crate::core::transaction::{Destination, Transaction};
    use crate::crypto::{KeyPair, Secp256k1Signer, ZERO_HASH};

    fn block_with(difficulty_target: u32, transactions: Vec<Transaction>) -> Block {
        Block::new(BLOCK_VERSION, 0, ZERO_HASH, difficulty_target, transactions, 0).unwrap()
    }

    fn coinbase() -> Transaction {
        let signer = Secp256k1Signer::new();
        Transaction::coinbase(&KeyPair::generate(), 0, 50, &signer).unwrap()
    }

    #[test]
    fn test_zero_target_always_solved() {
        let engine = ConsensusEngine::new();
        assert!(engine.is_solved(&block_with(0, vec![coinbase()])));
    }

    #[test]
    fn test_max_target_only_solved_by_max_score() {
        let engine = ConsensusEngine::new();
        let block = block_with(u32::MAX, vec![coinbase()]);
        let expected = ConsensusEngine::score(&block.hash()) == u32::MAX;
        assert_eq!(engine.is_solved(&block), expected);
    }

    #[test]
    fn test_meets_target_compares_leading_bytes() {
        let mut hash = ZERO_HASH;
        hash[0] = 0x80;
        assert!(ConsensusEngine::meets_target(&hash, 0x8000_0000));
        assert!(ConsensusEngine::meets_target(&hash, 0x7fff_ffff));
        assert!(!ConsensusEngine::meets_target(&hash, 0x8000_0001));
    }

    #[test]
    fn test_is_solved_matches_score() {
        let engine = ConsensusEngine::new();
        let block = block_with(0x8000_0000, vec![coinbase()]);
        let score = ConsensusEngine::score(&block.hash());
        assert_eq!(engine.is_solved(&block), score >= 0x8000_0000);
    }

    #[test]
    fn test_size_limit() {
        let engine = ConsensusEngine::new();
        assert_eq!(engine.max_block_size(), MAX_BLOCK_SIZE);

        let small = block_with(0, vec![coinbase()]);
        assert!(engine.is_size_ok(&small));

        let sender = KeyPair::generate();
        let big_message = vec![b'x'; MAX_BLOCK_SIZE];
        let transfer = Transaction::new(
            sender.address(),
            0,
            1,
            vec![Destination::new(sender.address(), 1, big_message)],
        );
        let big = block_with(0, vec![coinbase(), transfer]);
        assert!(big.size() > MAX_BLOCK_SIZE);
        assert!(!engine.is_size_ok(&big));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let block = block_with(0, vec![coinbase()]);
        let exact = ConsensusEngine::with_config(&ConsensusConfig {
            max_block_size: block.size(),
        });
        assert!(exact.is_size_ok(&block));

        let tight = ConsensusEngine::with_config(&ConsensusConfig {
            max_block_size: block.size() - 1,
        });
        assert!(!tight.is_size_ok(&block));
    }
}
