// Unconfirmed transaction pool

use crate::core::Transaction;
use std::collections::HashSet;

/// Admitted, not yet mined transactions in admission order.
///
/// Order matters: it is the inclusion order of the next mined block.
#[derive(Debug, Clone, Default)]
pub struct TxPool {
    transactions: Vec<Transaction>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Sum of amounts already pledged by `sender` in the pool
    pub fn pending_outflow(&self, sender: &str) -> f64 {
        self.transactions
            .iter()
            .filter(|tx| tx.sender == sender)
            .map(|tx| tx.amount)
            .sum()
    }

    /// Remove the first `count` entries (the ones included in a mined block)
    pub fn drain_front(&mut self, count: usize) {
        let count = count.min(self.transactions.len());
        self.transactions.drain(..count);
    }

    /// Drop every pending transaction whose content hash appears in `committed`.
    ///
    /// Returns the number of entries removed.
    pub fn prune_committed(&mut self, committed: &[Transaction]) -> usize {
        let hashes: HashSet<String> = committed.iter().map(Transaction::content_hash).collect();
        let before = self.transactions.len();
        self.transactions
            .retain(|tx| !hashes.contains(&tx.content_hash()));
        before - self.transactions.len()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_outflow() {
        let mut pool = TxPool::new();
        pool.push(Transaction::new("A", "B", 3.0));
        pool.push(Transaction::new("A", "C", 4.0));
        pool.push(Transaction::new("B", "A", 1.0));

        assert_eq!(pool.pending_outflow("A"), 7.0);
        assert_eq!(pool.pending_outflow("B"), 1.0);
        assert_eq!(pool.pending_outflow("Z"), 0.0);
    }

    #[test]
    fn test_drain_front_keeps_later_entries() {
        let mut pool = TxPool::new();
        pool.push(Transaction::new("A", "B", 1.0));
        pool.push(Transaction::new("A", "B", 2.0));
        pool.push(Transaction::new("A", "B", 3.0));

        pool.drain_front(2);
        assert_eq!(pool.transactions(), &[Transaction::new("A", "B", 3.0)]);

        pool.drain_front(10);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_prune_committed() {
        let mut pool = TxPool::new();
        pool.push(Transaction::new("A", "B", 1.0));
        pool.push(Transaction::new("C", "D", 2.0));

        let removed = pool.prune_committed(&[
            Transaction::new("A", "B", 1.0),
            Transaction::reward("M", 50.0),
        ]);

        assert_eq!(removed, 1);
        assert_eq!(pool.transactions(), &[Transaction::new("C", "D", 2.0)]);
    }
}
