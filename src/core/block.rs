// Block data structures

use crate::core::{content_hash, Transaction};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Block - a batch of transactions linked to its predecessor by hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, genesis is 0
    pub index: u64,
    /// Hash of the previous block
    pub previous_hash: String,
    /// Creation time (seconds since Unix epoch)
    pub timestamp: f64,
    /// Transactions in inclusion order
    pub transactions: Vec<Transaction>,
    /// Nonce for proof-of-work
    pub nonce: u64,
    /// Stored hash; empty until the block is sealed
    #[serde(default)]
    pub hash: String,
}

/// The hashed portion of a block (everything but `hash`)
#[derive(Serialize)]
struct BlockContent<'a> {
    index: u64,
    previous_hash: &'a str,
    timestamp: f64,
    transactions: &'a [Transaction],
    nonce: u64,
}

impl Block {
    /// Create an unsealed block with nonce 0
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        timestamp: f64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            timestamp,
            transactions,
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Create the genesis block
    pub fn genesis() -> Self {
        let mut genesis = Self::new(0, GENESIS_PREVIOUS_HASH, 0.0, Vec::new());
        genesis.hash = genesis.compute_hash();
        genesis
    }

    /// Recompute the content hash from the block's fields
    pub fn compute_hash(&self) -> String {
        content_hash(&BlockContent {
            index: self.index,
            previous_hash: &self.previous_hash,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            nonce: self.nonce,
        })
    }

    /// Whether the stored hash matches the content
    pub fn has_consistent_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// Current wall-clock time as fractional seconds
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block::new(
            1,
            Block::genesis().hash,
            1_700_000_000.25,
            vec![
                Transaction::new("A", "B", 10.0),
                Transaction::reward("A", 50.0),
            ],
        )
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.has_consistent_hash());
        // Genesis is fixed, every node derives the same one
        assert_eq!(genesis, Block::genesis());
    }

    #[test]
    fn test_block_hash_covers_nonce() {
        let mut block = sample_block();
        let before = block.compute_hash();
        block.nonce += 1;
        assert_ne!(before, block.compute_hash());
    }

    #[test]
    fn test_block_hash_ignores_stored_hash() {
        let mut block = sample_block();
        let before = block.compute_hash();
        block.hash = "deadbeef".to_string();
        assert_eq!(before, block.compute_hash());
    }

    #[test]
    fn test_wire_round_trip_preserves_hash() {
        let mut block = sample_block();
        block.nonce = 42;
        block.hash = block.compute_hash();

        let wire = serde_json::to_string(&block).unwrap();
        let decoded: Block = serde_json::from_str(&wire).unwrap();

        assert_eq!(decoded.compute_hash(), block.hash);
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_wire_round_trip_realistic_floats() {
        let start = now_timestamp();
        for i in 0..5_000u32 {
            let step = f64::from(i);
            let mut block = Block::new(
                u64::from(i) + 1,
                Block::genesis().hash,
                start + step * 0.001_37,
                vec![
                    Transaction::new("A", "B", 0.1 + step * 0.3),
                    Transaction::new("B", "C", 2.7),
                ],
            );
            block.hash = block.compute_hash();

            let wire = serde_json::to_vec(&block).unwrap();
            let decoded: Block = serde_json::from_slice(&wire).unwrap();

            assert_eq!(decoded.timestamp.to_bits(), block.timestamp.to_bits());
            assert_eq!(decoded.compute_hash(), block.hash, "timestamp {}", block.timestamp);
        }
    }

    #[test]
    fn test_decode_without_hash() {
        let json = r#"{"index":0,"previous_hash":"0","timestamp":0,"transactions":[],"nonce":0}"#;
        let block: Block = serde_json::from_str(json).unwrap();
        assert!(block.hash.is_empty());
        assert_eq!(block.compute_hash(), Block::genesis().hash);
    }
}
