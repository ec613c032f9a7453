//! Blockchain: an ordered, append-only sequence of blocks
//!
//! The chain itself performs no validation; the
//! [`ChainValidator`](crate::core::ChainValidator) decides what may be
//! appended.

use crate::core::block::{Block, INITIAL_DIFFICULTY_TARGET};
use crate::crypto::{Hash256, ZERO_HASH};

/// Blocks indexed by height, genesis at 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing list of blocks without validating it
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks in the chain
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Get a block by height
    pub fn get(&self, height: usize) -> Option<&Block> {
        self.blocks.get(height)
    }

    /// Get a block by hash
    pub fn get_by_hash(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.hash() == hash)
    }

    /// Get the latest block
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Hash of the tip, or the zero hash for an empty chain
    pub fn hash(&self) -> Hash256 {
        self.tip().map(Block::hash).unwrap_or(ZERO_HASH)
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Difficulty target of the tip, or the initial target for an empty chain
    pub fn current_difficulty(&self) -> u32 {
        self.tip()
            .map(Block::difficulty_target)
            .unwrap_or(INITIAL_DIFFICULTY_TARGET)
    }

    /// Append a block without validation
    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Drop every block at or above `height`
    pub fn truncate(&mut self, height: usize) {
        self.blocks.truncate(height);
    }
}
