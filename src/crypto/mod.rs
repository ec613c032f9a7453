//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing
//! - ECDSA key management and the signing capability (secp256k1)
//! - Merkle root calculation

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{leading_score, sha256, sha256_hex, sha256_pair, Hash256, ZERO_HASH};
pub use keys::{
    Address, KeyError, KeyPair, Secp256k1Signer, Signature, Signer, ADDRESS_SIZE, SIGNATURE_SIZE,
};
pub use merkle::{calculate_merkle_root, leaf_count, MerkleError};
