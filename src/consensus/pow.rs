// Proof of Work implementation

use crate::core::{leading_zeros, Block};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Nonces tried between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Shared flag used to abandon an in-flight proof-of-work search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Proof of Work miner
#[derive(Debug, Clone)]
pub struct Miner {
    /// Required number of leading zero hex characters
    pub difficulty: usize,
}

impl Miner {
    /// Create a new miner with fixed difficulty
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    /// Whether `hash` has the required leading-zero prefix
    #[inline]
    pub fn meets_difficulty(&self, hash: &str) -> bool {
        leading_zeros(hash) >= self.difficulty
    }

    /// Search nonces from 0 until the block hash meets the difficulty.
    ///
    /// Blocks the calling thread for the whole search. On success the nonce
    /// is left on the block and the winning hash is returned; the stored
    /// `hash` field is not touched.
    pub fn proof_of_work(&self, block: &mut Block) -> MiningResult {
        self.mine(block, &CancelToken::new())
            .expect("search without a cancel source always completes")
    }

    /// Cancellable proof-of-work search, `None` if `cancel` fired first
    pub fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Option<MiningResult> {
        let start_time = Instant::now();
        let mut attempts = 0u64;

        block.nonce = 0;
        loop {
            let hash = block.compute_hash();
            attempts += 1;

            if self.meets_difficulty(&hash) {
                return Some(MiningResult {
                    nonce: block.nonce,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                });
            }

            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                log::debug!(
                    "Mining of block {} cancelled after {} attempts",
                    block.index,
                    attempts
                );
                return None;
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }

            block.nonce += 1;
        }
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// The nonce that was found
    pub nonce: u64,
    /// The resulting hash
    pub hash: String,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    fn candidate() -> Block {
        Block::new(
            1,
            Block::genesis().hash,
            1234567890.0,
            vec![Transaction::reward("miner", 50.0)],
        )
    }

    #[test]
    fn test_meets_difficulty() {
        let miner = Miner::new(2);
        assert!(miner.meets_difficulty("00ab"));
        assert!(miner.meets_difficulty("000b"));
        assert!(!miner.meets_difficulty("0abc"));
        assert!(Miner::new(0).meets_difficulty("abcd"));
    }

    #[test]
    fn test_pow_mining_easy() {
        let miner = Miner::new(2);
        let mut block = candidate();

        let result = miner.proof_of_work(&mut block);
        assert!(result.hash.starts_with("00"));
        assert_eq!(result.hash, block.compute_hash());
        assert_eq!(result.nonce, block.nonce);
        assert_eq!(result.attempts, block.nonce + 1);
    }

    #[test]
    fn test_pow_is_deterministic() {
        let miner = Miner::new(2);
        let mut a = candidate();
        let mut b = candidate();
        assert_eq!(miner.proof_of_work(&mut a).hash, miner.proof_of_work(&mut b).hash);
    }

    #[test]
    fn test_cancelled_search_stops() {
        // Unreachable difficulty: only cancellation can end the search
        let miner = Miner::new(64);
        let mut block = candidate();
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(miner.mine(&mut block, &cancel).is_none());
        assert!(block.nonce < 2 * CANCEL_CHECK_INTERVAL);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
