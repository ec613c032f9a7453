//! Merkle tree root computation over transaction hashes
//!
//! Follows the Bitcoin layout: pair consecutive hashes left to right,
//! hash each pair with SHA-256 and duplicate the last hash of a level
//! when the level has an odd number of entries.

use super::hash::{sha256_pair, Hash256};
use thiserror::Error;

/// Merkle tree errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot calculate root from empty merkle tree")]
    EmptyTree,
    #[error("merkle tree has {0} leaves, more than a u32 count holds")]
    TooManyLeaves(usize),
}

/// Leaf count as carried in a block header
pub fn leaf_count(len: usize) -> Result<u32, MerkleError> {
    u32::try_from(len).map_err(|_| MerkleError::TooManyLeaves(len))
}

/// Calculate the merkle root from a list of transaction hashes
pub fn calculate_merkle_root(hashes: &[Hash256]) -> Result<Hash256, MerkleError> {
    if hashes.is_empty() {
        return Err(MerkleError::EmptyTree);
    }

    let mut current_level: Vec<Hash256> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|chunk| {
                // Duplicate the last hash if odd number
                let left = &chunk[0];
                let right = chunk.get(1).unwrap_or(left);
                sha256_pair(left, right)
            })
            .collect();
    }

    Ok(current_level[0])
}
