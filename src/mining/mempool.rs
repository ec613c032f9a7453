//! Transaction pool (mempool) for pending transactions
//!
//! Unconfirmed transactions keyed by their hex hash, handed out to the miner
//! in arrival order. The pool does no validation; the chain validator
//! decides when a block including them is assembled.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use log::debug;
use std::collections::HashMap;

/// Default maximum mempool transaction count
pub const DEFAULT_MEMPOOL_SIZE: usize = 10_000;

/// Pending transactions
#[derive(Debug, Clone)]
pub struct Mempool {
    /// Transactions indexed by hash
    entries: HashMap<String, Transaction>,
    /// Transaction hashes in order of arrival
    by_time: Vec<String>,
    max_size: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MEMPOOL_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_time: Vec::new(),
            max_size,
        }
    }

    /// Add a transaction; false if it is already pooled or the pool is full
    pub fn put(&mut self, tx: Transaction) -> bool {
        let hash = tx.hash_hex();
        if self.entries.contains_key(&hash) {
            return false;
        }
        if self.entries.len() >= self.max_size {
            debug!("Mempool full, dropping {}", hash);
            return false;
        }

        self.by_time.push(hash.clone());
        self.entries.insert(hash, tx);
        true
    }

    pub fn contains(&self, hash_hex: &str) -> bool {
        self.entries.contains_key(hash_hex)
    }

    pub fn get(&self, hash_hex: &str) -> Option<&Transaction> {
        self.entries.get(hash_hex)
    }

    pub fn remove(&mut self, hash_hex: &str) -> Option<Transaction> {
        let tx = self.entries.remove(hash_hex)?;
        self.by_time.retain(|h| h != hash_hex);
        Some(tx)
    }

    /// All pooled transactions in arrival order
    pub fn transactions(&self) -> Vec<&Transaction> {
        self.by_time
            .iter()
            .filter_map(|hash| self.entries.get(hash))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return up to `n` of the oldest transactions
    pub fn take(&mut self, n: usize) -> Vec<Transaction> {
        let count = n.min(self.by_time.len());
        self.by_time
            .drain(..count)
            .filter_map(|hash| self.entries.remove(&hash))
            .collect()
    }

    /// Drop every transaction confirmed by `block`
    pub fn remove_confirmed(&mut self, block: &Block) {
        for tx in block.transactions() {
            self.remove(&tx.hash_hex());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_time.clear();
    }
}
