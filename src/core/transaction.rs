//! Transactions and their destinations
//!
//! An account-model transfer: one sender pays a fee and sends amounts to
//! one or more destinations. A transaction whose sender is the all-zero
//! address is a coinbase: the block reward claim, signed by its sole
//! beneficiary.
//!
//! Wire layout (big-endian):
//! - Destination: `address(33) || amount(8) || messageLen(4) || message`
//! - Signable: `from(33) || sequence(4) || fee(8) || destCount(4) || destinations...`
//! - Full: signable bytes followed by `signature(65)`

use crate::core::codec::{put_len, put_u32, put_u64, ByteReader, Decode, DecodeError, Encode};
use crate::crypto::{
    sha256, Address, Hash256, KeyError, KeyPair, Signature, Signer, ADDRESS_SIZE, SIGNATURE_SIZE,
};

/// Fixed part of an encoded destination: address + amount + message length
const DESTINATION_FIXED_SIZE: usize = ADDRESS_SIZE + 8 + 4;

/// Fixed part of the signable bytes: from + sequence + fee + destination count
const SIGNABLE_FIXED_SIZE: usize = ADDRESS_SIZE + 4 + 8 + 4;

/// Smallest possible encoded transaction (no destinations)
pub const MIN_TRANSACTION_SIZE: usize = SIGNABLE_FIXED_SIZE + SIGNATURE_SIZE;

// =============================================================================
// Destination
// =============================================================================

/// A single payment inside a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    address: Address,
    amount: u64,
    message: Vec<u8>,
}

impl Destination {
    pub fn new(address: Address, amount: u64, message: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            amount,
            message: message.into(),
        }
    }

    /// A destination without an attached message
    pub fn to(address: Address, amount: u64) -> Self {
        Self::new(address, amount, Vec::new())
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// The message decoded as UTF-8, replacing invalid sequences
    pub fn message_utf8(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

impl Encode for Destination {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.address.as_bytes());
        put_u64(out, self.amount);
        put_len(out, self.message.len());
        out.extend_from_slice(&self.message);
    }

    fn encoded_len(&self) -> usize {
        DESTINATION_FIXED_SIZE + self.message.len()
    }
}

impl Decode for Destination {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let address = Address(reader.array("destination address")?);
        let amount = reader.u64("destination amount")?;
        let len = reader.u32("destination message length")? as usize;
        let message = reader.take("destination message", len)?.to_vec();
        Ok(Self {
            address,
            amount,
            message,
        })
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// An immutable, optionally signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    from: Address,
    sequence: u32,
    fee: u64,
    destinations: Vec<Destination>,
    signature: Signature,
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(from: Address, sequence: u32, fee: u64, destinations: Vec<Destination>) -> Self {
        Self {
            from,
            sequence,
            fee,
            destinations,
            signature: Signature::EMPTY,
        }
    }

    /// Create a transfer signed by the sender's key pair
    pub fn signed(
        sender: &KeyPair,
        sequence: u32,
        fee: u64,
        destinations: Vec<Destination>,
        signer: &impl Signer,
    ) -> Result<Self, KeyError> {
        let unsigned = Self::new(sender.address(), sequence, fee, destinations);
        let signature = sender.sign_digest(signer, &unsigned.hash())?;
        Ok(unsigned.with_signature(signature))
    }

    /// Create a coinbase transaction paying `reward` to the beneficiary,
    /// who signs their own claim
    pub fn coinbase(
        beneficiary: &KeyPair,
        sequence: u32,
        reward: u64,
        signer: &impl Signer,
    ) -> Result<Self, KeyError> {
        let destination = Destination::to(beneficiary.address(), reward);
        let unsigned = Self::new(Address::COINBASE, sequence, 0, vec![destination]);
        let signature = beneficiary.sign_digest(signer, &unsigned.hash())?;
        Ok(unsigned.with_signature(signature))
    }

    /// Return a copy carrying the given signature
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn sender(&self) -> &Address {
        &self.from
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Whether this is a miner reward claim
    pub fn is_coinbase(&self) -> bool {
        self.from.is_coinbase_sentinel()
    }

    /// Sum of all destination amounts
    pub fn total_sent(&self) -> u128 {
        self.destinations
            .iter()
            .map(|d| u128::from(d.amount))
            .sum()
    }

    /// The canonical bytes that are hashed and signed
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.signable_len());
        self.encode_signable(&mut out);
        out
    }

    /// Transaction hash: SHA-256 over the signable bytes
    pub fn hash(&self) -> Hash256 {
        sha256(&self.signable_bytes())
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    fn signable_len(&self) -> usize {
        SIGNABLE_FIXED_SIZE
            + self
                .destinations
                .iter()
                .map(Encode::encoded_len)
                .sum::<usize>()
    }

    fn encode_signable(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.from.as_bytes());
        put_u32(out, self.sequence);
        put_u64(out, self.fee);
        put_len(out, self.destinations.len());
        for destination in &self.destinations {
            destination.encode_to(out);
        }
    }
}

impl Encode for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.encode_signable(out);
        out.extend_from_slice(self.signature.as_bytes());
    }

    fn encoded_len(&self) -> usize {
        self.signable_len() + SIGNATURE_SIZE
    }
}

impl Decode for Transaction {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let from = Address(reader.array("transaction sender")?);
        let sequence = reader.u32("transaction sequence")?;
        let fee = reader.u64("transaction fee")?;
        let count = reader.u32("destination count")? as usize;

        // Preallocate no more than the remaining input can hold
        let mut destinations =
            Vec::with_capacity(count.min(reader.remaining() / DESTINATION_FIXED_SIZE));
        for _ in 0..count {
            destinations.push(Destination::decode_from(reader)?);
        }

        let signature = Signature(reader.array("transaction signature")?);

        Ok(Self {
            from,
            sequence,
            fee,
            destinations,
            signature,
        })
    }
}
