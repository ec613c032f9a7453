//! Journaled balance cache
//!
//! Account balances plus an append-only journal of every mutation. A
//! snapshot is just the journal length; reverting to it pops and inverts
//! the newer entries in reverse order, restoring balances exactly.
//!
//! Balances are unsigned. A debit that would go negative fails without
//! touching state, which is how overspending is detected.

use crate::crypto::Address;
use std::collections::HashMap;
use thiserror::Error;

/// Balance amount
pub type Balance = u128;

/// Balance cache errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("overspend: {address} has {balance}, tried to debit {amount}")]
    Overspend {
        address: Address,
        balance: Balance,
        amount: Balance,
    },
    #[error("balance overflow crediting {amount} to {address}")]
    Overflow { address: Address, amount: Balance },
}

/// A recorded balance mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub address: Address,
    pub amount: Balance,
    pub positive: bool,
}

/// Opaque checkpoint into the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Snapshot(usize);

/// Address balances with snapshot/revert
#[derive(Debug, Clone, Default)]
pub struct BalanceCache {
    balances: HashMap<Address, Balance>,
    journal: Vec<JournalEntry>,
    validated_length: usize,
}

impl BalanceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an address, zero if never seen
    pub fn get_balance(&self, address: &Address) -> Balance {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Credit an address
    pub fn add_balance(&mut self, address: &Address, amount: Balance) -> Result<(), BalanceError> {
        let current = self.get_balance(address);
        let updated = current
            .checked_add(amount)
            .ok_or(BalanceError::Overflow {
                address: *address,
                amount,
            })?;
        self.balances.insert(*address, updated);
        self.journal.push(JournalEntry {
            address: *address,
            amount,
            positive: true,
        });
        Ok(())
    }

    /// Debit an address; fails without mutating if the balance is too low
    pub fn subtract_balance(
        &mut self,
        address: &Address,
        amount: Balance,
    ) -> Result<(), BalanceError> {
        let current = self.get_balance(address);
        let updated = current
            .checked_sub(amount)
            .ok_or(BalanceError::Overspend {
                address: *address,
                balance: current,
                amount,
            })?;
        self.balances.insert(*address, updated);
        self.journal.push(JournalEntry {
            address: *address,
            amount,
            positive: false,
        });
        Ok(())
    }

    /// Checkpoint the current journal position
    pub fn take_snapshot(&self) -> Snapshot {
        Snapshot(self.journal.len())
    }

    /// Undo every mutation recorded after `snapshot`, newest first
    pub fn revert(&mut self, snapshot: Snapshot) {
        let start = snapshot.0.min(self.journal.len());
        for entry in self.journal.drain(start..).rev() {
            let balance = self.balances.entry(entry.address).or_insert(0);
            // journal entries were applied successfully, so their inverse cannot fail
            if entry.positive {
                *balance -= entry.amount;
            } else {
                *balance += entry.amount;
            }
        }
    }

    pub fn validated_length(&self) -> usize {
        self.validated_length
    }

    pub fn set_validated_length(&mut self, upto: usize) {
        self.validated_length = upto;
    }

    /// Number of journal entries recorded so far
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Iterate over all addresses seen so far and their balances
    pub fn balances(&self) -> impl Iterator<Item = (&Address, Balance)> {
        self.balances.iter().map(|(address, balance)| (address, *balance))
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// A zero balance and an unseen address are the same state
impl PartialEq for BalanceCache {
    fn eq(&self, other: &Self) -> bool {
        let covers = |a: &Self, b: &Self| {
            a.balances
                .iter()
                .all(|(address, balance)| b.get_balance(address) == *balance)
        };
        self.validated_length == other.validated_length
            && self.journal == other.journal
            && covers(self, other)
            && covers(other, self)
    }
}

impl Eq for BalanceCache {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn addresses(n: usize) -> Vec<Address> {
        (0..n).map(|_| KeyPair::generate().address()).collect()
    }

    #[test]
    fn test_unseen_address_is_zero() {
        let cache = BalanceCache::new();
        assert_eq!(cache.get_balance(&KeyPair::generate().address()), 0);
        assert_eq!(cache.validated_length(), 0);
    }

    #[test]
    fn test_add_and_subtract() {
        let mut cache = BalanceCache::new();
        let a = KeyPair::generate().address();

        cache.add_balance(&a, 100).unwrap();
        cache.subtract_balance(&a, 30).unwrap();

        assert_eq!(cache.get_balance(&a), 70);
        assert_eq!(cache.journal_len(), 2);
        assert_eq!(
            cache.journal()[1],
            JournalEntry {
                address: a,
                amount: 30,
                positive: false
            }
        );
    }

    #[test]
    fn test_overspend_does_not_mutate() {
        let mut cache = BalanceCache::new();
        let a = KeyPair::generate().address();
        cache.add_balance(&a, 10).unwrap();

        let err = cache.subtract_balance(&a, 11).unwrap_err();
        assert_eq!(
            err,
            BalanceError::Overspend {
                address: a,
                balance: 10,
                amount: 11
            }
        );
        assert_eq!(cache.get_balance(&a), 10);
        assert_eq!(cache.journal_len(), 1);
    }

    #[test]
    fn test_overflow_does_not_mutate() {
        let mut cache = BalanceCache::new();
        let a = KeyPair::generate().address();
        cache.add_balance(&a, Balance::MAX).unwrap();
        assert!(matches!(
            cache.add_balance(&a, 1),
            Err(BalanceError::Overflow { .. })
        ));
        assert_eq!(cache.get_balance(&a), Balance::MAX);
    }

    #[test]
    fn test_revert_restores_exact_balances() {
        let mut cache = BalanceCache::new();
        let addrs = addresses(3);

        cache.add_balance(&addrs[0], 500).unwrap();
        cache.add_balance(&addrs[1], 20).unwrap();
        let before: Vec<Balance> = addrs.iter().map(|a| cache.get_balance(a)).collect();

        let snapshot = cache.take_snapshot();
        cache.subtract_balance(&addrs[0], 200).unwrap();
        cache.add_balance(&addrs[1], 200).unwrap();
        cache.add_balance(&addrs[2], 7).unwrap();
        cache.subtract_balance(&addrs[1], 220).unwrap();
        cache.add_balance(&addrs[0], 3).unwrap();

        cache.revert(snapshot);

        let after: Vec<Balance> = addrs.iter().map(|a| cache.get_balance(a)).collect();
        assert_eq!(before, after);
        assert_eq!(cache.journal_len(), 2);
    }

    #[test]
    fn test_nested_snapshots() {
        let mut cache = BalanceCache::new();
        let a = KeyPair::generate().address();

        cache.add_balance(&a, 100).unwrap();
        let outer = cache.take_snapshot();
        cache.add_balance(&a, 50).unwrap();
        let inner = cache.take_snapshot();
        cache.subtract_balance(&a, 120).unwrap();

        cache.revert(inner);
        assert_eq!(cache.get_balance(&a), 150);
        cache.revert(outer);
        assert_eq!(cache.get_balance(&a), 100);
    }

    #[test]
    fn test_revert_to_current_is_noop() {
        let mut cache = BalanceCache::new();
        let a = KeyPair::generate().address();
        cache.add_balance(&a, 5).unwrap();

        let snapshot = cache.take_snapshot();
        cache.revert(snapshot);
        assert_eq!(cache.get_balance(&a), 5);
        assert_eq!(cache.journal_len(), 1);
    }

    #[test]
    fn test_reverted_credit_equals_unseen() {
        let mut cache = BalanceCache::new();
        let before = cache.clone();
        let snapshot = cache.take_snapshot();
        cache.add_balance(&KeyPair::generate().address(), 9).unwrap();
        assert_ne!(cache, before);

        cache.revert(snapshot);
        assert_eq!(cache, before);
    }

    #[test]
    fn test_reset() {
        let mut cache = BalanceCache::new();
        let a = KeyPair::generate().address();
        cache.add_balance(&a, 5).unwrap();
        cache.set_validated_length(3);

        cache.reset();
        assert_eq!(cache, BalanceCache::new());
    }
}
