//! Per-transaction checks: signatures and protocol rules

use crate::core::transaction::Transaction;
use crate::crypto::{Secp256k1Signer, Signer};

/// Transaction-level checks run by the validator for every transaction
pub trait TransactionVerifier {
    /// Check the signature and the structural rules tied to it
    fn verify_signature(&self, tx: &Transaction) -> bool;

    /// Protocol-specific transaction rules
    fn verify_consensus(&self, tx: &Transaction) -> bool;
}

/// Default verifier backed by a [`Signer`]
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier<S = Secp256k1Signer> {
    signer: S,
}

impl SignatureVerifier<Secp256k1Signer> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Signer> SignatureVerifier<S> {
    pub fn with_signer(signer: S) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }
}

impl<S: Signer> TransactionVerifier for SignatureVerifier<S> {
    fn verify_signature(&self, tx: &Transaction) -> bool {
        let digest = tx.hash();

        if tx.is_coinbase() {
            // a reward claim pays exactly one beneficiary, carries no fee
            // and is signed by that beneficiary
            let [beneficiary] = tx.destinations() else {
                return false;
            };
            if tx.fee() != 0 {
                return false;
            }
            return self
                .signer
                .verify(tx.signature(), &digest, beneficiary.address());
        }

        if tx.destinations().is_empty() {
            return false;
        }
        self.signer.verify(tx.signature(), &digest, tx.sender())
    }

    fn verify_consensus(&self, _tx: &Transaction) -> bool {
        // No protocol rules beyond signatures and balances yet
        true
    }
}
