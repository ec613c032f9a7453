//! Block implementation for the ledger
//!
//! A block carries a header and an ordered list of transactions. Blocks are
//! immutable once built; the mining loop works on a separate
//! [`BlockCandidate`](crate::mining::BlockCandidate) and seals it into a
//! `Block` once a nonce is found.
//!
//! Two encodings exist:
//! - header bytes (hashed for proof of work):
//!   `version(4) || height(4) || prevBlockHash(32) || difficultyTarget(4) || txCount(4) || merkleRoot(32) || nonce(4)`
//! - storage bytes (transport and size limit):
//!   `version(4) || height(4) || prevBlockHash(32) || difficultyTarget(4) || txCount(4) || transactions... || nonce(4)`
//!
//! The merkle root is not stored; it is recomputed on decode.

use crate::core::codec::{put_len, put_u32, ByteReader, Decode, DecodeError, Encode};
use crate::core::transaction::{Transaction, MIN_TRANSACTION_SIZE};
use crate::crypto::{
    calculate_merkle_root, leaf_count, sha256, Hash256, KeyError, KeyPair, MerkleError, Signer,
    ZERO_HASH,
};
use thiserror::Error;

// =============================================================================
// Block Constants
// =============================================================================

/// Current block version
pub const BLOCK_VERSION: u32 = 1;

/// Header size in bytes
pub const BLOCK_HEADER_SIZE: usize = 4 + 4 + 32 + 4 + 4 + 32 + 4;

/// Storage encoding size of a block without transactions
pub const BLOCK_FIXED_SIZE: usize = 4 + 4 + 32 + 4 + 4 + 4;

/// Initial difficulty target for an empty chain
pub const INITIAL_DIFFICULTY_TARGET: u32 = 0xeeff_ffff;

// =============================================================================
// Block Errors
// =============================================================================

/// Block construction errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Invalid merkle tree: {0}")]
    Merkle(#[from] MerkleError),
    #[error("Signing failed: {0}")]
    Key(#[from] KeyError),
}

// =============================================================================
// Block Header
// =============================================================================

/// Block header: everything that goes into the block hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub height: u32,
    pub prev_block_hash: Hash256,
    pub difficulty_target: u32,
    pub tx_count: u32,
    pub merkle_root: Hash256,
    pub nonce: u32,
}

impl BlockHeader {
    /// The bytes hashed for proof of work
    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut out = Vec::with_capacity(BLOCK_HEADER_SIZE);
        put_u32(&mut out, self.version);
        put_u32(&mut out, self.height);
        out.extend_from_slice(&self.prev_block_hash);
        put_u32(&mut out, self.difficulty_target);
        put_u32(&mut out, self.tx_count);
        out.extend_from_slice(&self.merkle_root);
        put_u32(&mut out, self.nonce);

        let mut bytes = [0u8; BLOCK_HEADER_SIZE];
        bytes.copy_from_slice(&out);
        bytes
    }

    /// SHA-256 over the header bytes
    pub fn hash(&self) -> Hash256 {
        sha256(&self.encode())
    }
}

// =============================================================================
// Block
// =============================================================================

/// An immutable block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block, deriving its merkle root from the transactions
    pub fn new(
        version: u32,
        height: u32,
        prev_block_hash: Hash256,
        difficulty_target: u32,
        transactions: Vec<Transaction>,
        nonce: u32,
    ) -> Result<Self, MerkleError> {
        let merkle_root = Self::calculate_merkle_root(&transactions)?;
        let tx_count = leaf_count(transactions.len())?;
        let header = BlockHeader {
            version,
            height,
            prev_block_hash,
            difficulty_target,
            tx_count,
            merkle_root,
            nonce,
        };
        Ok(Self {
            header,
            transactions,
        })
    }

    /// Create an unmined genesis block paying `reward` to the beneficiary
    pub fn genesis(
        beneficiary: &KeyPair,
        reward: u64,
        difficulty_target: u32,
        signer: &impl Signer,
    ) -> Result<Self, BlockError> {
        let coinbase = Transaction::coinbase(beneficiary, 0, reward, signer)?;
        Ok(Self::new(
            BLOCK_VERSION,
            0,
            ZERO_HASH,
            difficulty_target,
            vec![coinbase],
            0,
        )?)
    }

    /// Assemble a block from a header whose merkle root already matches
    pub(crate) fn from_parts(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Calculate the merkle root from transactions
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Result<Hash256, MerkleError> {
        let tx_hashes: Vec<Hash256> = transactions.iter().map(Transaction::hash).collect();
        calculate_merkle_root(&tx_hashes)
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn prev_block_hash(&self) -> &Hash256 {
        &self.header.prev_block_hash
    }

    pub fn prev_block_hash_hex(&self) -> String {
        hex::encode(self.header.prev_block_hash)
    }

    pub fn difficulty_target(&self) -> u32 {
        self.header.difficulty_target
    }

    pub fn merkle_root(&self) -> &Hash256 {
        &self.header.merkle_root
    }

    pub fn nonce(&self) -> u32 {
        self.header.nonce
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Block hash: SHA-256 over the header bytes
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Get the coinbase transaction (first transaction)
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Size of the storage encoding in bytes
    pub fn size(&self) -> usize {
        self.encoded_len()
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Encode for Block {
    fn encode_to(&self, out: &mut Vec<u8>) {
        put_u32(out, self.header.version);
        put_u32(out, self.header.height);
        out.extend_from_slice(&self.header.prev_block_hash);
        put_u32(out, self.header.difficulty_target);
        put_len(out, self.transactions.len());
        for tx in &self.transactions {
            tx.encode_to(out);
        }
        put_u32(out, self.header.nonce);
    }

    fn encoded_len(&self) -> usize {
        BLOCK_FIXED_SIZE
            + self
                .transactions
                .iter()
                .map(Encode::encoded_len)
                .sum::<usize>()
    }
}

impl Decode for Block {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let version = reader.u32("block version")?;
        let height = reader.u32("block height")?;
        let prev_block_hash = reader.array("previous block hash")?;
        let difficulty_target = reader.u32("difficulty target")?;
        let count = reader.u32("transaction count")? as usize;

        let mut transactions = Vec::with_capacity(count.min(reader.remaining() / MIN_TRANSACTION_SIZE));
        for _ in 0..count {
            transactions.push(Transaction::decode_from(reader)?);
        }

        let nonce = reader.u32("block nonce")?;

        Ok(Self::new(
            version,
            height,
            prev_block_hash,
            difficulty_target,
            transactions,
            nonce,
        )?)
    }
}
