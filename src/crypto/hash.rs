//! Cryptographic hashing utilities for the ledger
//!
//! Every hash in the protocol is a single SHA-256: block hashes over the
//! header bytes, transaction hashes over the signable bytes and merkle
//! parents over the concatenation of two children.

use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest
pub type Hash256 = [u8; 32];

/// The all-zero hash, used as the parent of the genesis block
pub const ZERO_HASH: Hash256 = [0u8; 32];

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes SHA-256 over the concatenation of two byte strings
pub fn sha256_pair(left: &[u8], right: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Big-endian score of a hash: its first four bytes read as a u32
pub fn leading_score(hash: &Hash256) -> u32 {
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_pair_matches_concat() {
        let joined = [b"left".as_slice(), b"right".as_slice()].concat();
        assert_eq!(sha256_pair(b"left", b"right"), sha256(&joined));
    }

    #[test]
    fn test_leading_score() {
        let mut hash = ZERO_HASH;
        hash[0] = 0x12;
        hash[1] = 0x34;
        hash[2] = 0x56;
        hash[3] = 0x78;
        hash[4] = 0xff;
        assert_eq!(leading_score(&hash), 0x1234_5678);
    }
}
