//! ECDSA key management and the signing capability
//!
//! Addresses are 33-byte compressed secp256k1 public keys. Signatures are
//! 65 bytes: a 64-byte compact ECDSA signature followed by a one-byte
//! recovery id. Signing and verification sit behind the [`Signer`] trait so
//! the curve implementation can be swapped.

use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::hash::Hash256;

/// Length of a compressed public key / address
pub const ADDRESS_SIZE: usize = 33;

/// Length of a recoverable signature (compact signature + recovery id)
pub const SIGNATURE_SIZE: usize = 65;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

// =============================================================================
// Address
// =============================================================================

/// A 33-byte compressed public key identifying an account
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// The sentinel sender of coinbase transactions
    pub const COINBASE: Address = Address([0u8; ADDRESS_SIZE]);

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn is_coinbase_sentinel(&self) -> bool {
        *self == Self::COINBASE
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the address as a secp256k1 public key
    pub fn to_public_key(&self) -> Result<PublicKey, KeyError> {
        PublicKey::from_slice(&self.0).map_err(|_| KeyError::InvalidPublicKey)
    }
}

impl From<PublicKey> for Address {
    fn from(public_key: PublicKey) -> Self {
        Address(public_key.serialize())
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        let bytes: [u8; ADDRESS_SIZE] =
            bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Signature
// =============================================================================

/// A 65-byte recoverable ECDSA signature
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Placeholder signature carried by unsigned transactions
    pub const EMPTY: Signature = Signature([0u8; SIGNATURE_SIZE]);

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// The 64-byte compact part
    pub fn compact(&self) -> &[u8] {
        &self.0[..64]
    }

    pub fn recovery_byte(&self) -> u8 {
        self.0[64]
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

// =============================================================================
// Signing capability
// =============================================================================

/// Produces and checks recoverable signatures over 32-byte digests
pub trait Signer {
    fn sign(&self, digest: &Hash256, key: &SecretKey) -> Result<Signature, KeyError>;
    fn verify(&self, signature: &Signature, digest: &Hash256, public_key: &Address) -> bool;
}

/// secp256k1 implementation of [`Signer`]
#[derive(Clone)]
pub struct Secp256k1Signer {
    secp: Secp256k1<All>,
}

impl Secp256k1Signer {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Recover the address that produced `signature` over `digest`
    pub fn recover(&self, signature: &Signature, digest: &Hash256) -> Result<Address, KeyError> {
        let byte = signature.recovery_byte();
        let recovery_id =
            RecoveryId::from_i32(i32::from(byte)).map_err(|_| KeyError::InvalidRecoveryId(byte))?;
        let sig = RecoverableSignature::from_compact(signature.compact(), recovery_id)
            .map_err(|_| KeyError::InvalidSignature)?;
        let message = Message::from_digest(*digest);
        let public_key = self.secp.recover_ecdsa(&message, &sig)?;
        Ok(Address::from(public_key))
    }
}

impl Default for Secp256k1Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Secp256k1Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secp256k1Signer")
    }
}

impl Signer for Secp256k1Signer {
    fn sign(&self, digest: &Hash256, key: &SecretKey) -> Result<Signature, KeyError> {
        let message = Message::from_digest(*digest);
        let (recovery_id, compact) = self
            .secp
            .sign_ecdsa_recoverable(&message, key)
            .serialize_compact();

        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&compact);
        // recovery ids are 0..=3
        bytes[64] = recovery_id.to_i32() as u8;
        Ok(Signature(bytes))
    }

    fn verify(&self, signature: &Signature, digest: &Hash256, public_key: &Address) -> bool {
        let Ok(public_key) = public_key.to_public_key() else {
            return false;
        };
        let Ok(sig) = secp256k1::ecdsa::Signature::from_compact(signature.compact()) else {
            return false;
        };
        let message = Message::from_digest(*digest);
        self.secp.verify_ecdsa(&message, &sig, &public_key).is_ok()
    }
}

// =============================================================================
// Key pair
// =============================================================================

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// The account address: the compressed public key
    pub fn address(&self) -> Address {
        Address::from(self.public_key)
    }

    /// Sign a 32-byte digest with this key pair
    pub fn sign_digest(&self, signer: &impl Signer, digest: &Hash256) -> Result<Signature, KeyError> {
        signer.sign(digest, &self.secret_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
