// Block and chain validation

use crate::consensus::pow::Miner;
use crate::core::Block;

/// Why a single block was refused by `append`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusRejection {
    /// Block does not build on the current tip
    PreviousHashMismatch { expected: String, found: String },
    /// Block index is not tip + 1
    IndexMismatch { expected: u64, found: u64 },
    /// Hash misses the difficulty prefix or does not match the content
    InvalidProof { index: u64 },
    /// A block at this index was committed while mining was in flight
    Superseded { index: u64 },
}

impl std::fmt::Display for ConsensusRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConsensusRejection::PreviousHashMismatch { expected, found } => write!(
                f,
                "previous_hash mismatch: expected {}, found {}",
                expected, found
            ),
            ConsensusRejection::IndexMismatch { expected, found } => {
                write!(f, "index mismatch: expected {}, found {}", expected, found)
            }
            ConsensusRejection::InvalidProof { index } => {
                write!(f, "invalid proof of work for block {}", index)
            }
            ConsensusRejection::Superseded { index } => {
                write!(f, "block {} was superseded while mining", index)
            }
        }
    }
}

impl std::error::Error for ConsensusRejection {}

/// Why a candidate chain failed full validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Chain has no blocks
    Empty,
    /// Genesis stored hash differs from its content hash
    InvalidGenesis,
    /// Block at `position` has the wrong index
    IndexGap { position: usize, index: u64 },
    /// Block at `position` does not link to its predecessor
    BrokenLink { position: usize },
    /// Block at `position` fails proof-of-work
    InvalidProof { position: usize },
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ChainError::Empty => write!(f, "Chain is empty"),
            ChainError::InvalidGenesis => write!(f, "Genesis hash does not match its content"),
            ChainError::IndexGap { position, index } => {
                write!(f, "Block at position {} has index {}", position, index)
            }
            ChainError::BrokenLink { position } => {
                write!(f, "Block at position {} does not link to its parent", position)
            }
            ChainError::InvalidProof { position } => {
                write!(f, "Block at position {} has an invalid proof of work", position)
            }
        }
    }
}

impl std::error::Error for ChainError {}

/// Chain validator
#[derive(Debug, Clone)]
pub struct ChainValidator {
    /// PoW miner for verification
    miner: Miner,
}

impl ChainValidator {
    /// Create a new validator with fixed difficulty
    pub fn new(difficulty: usize) -> Self {
        Self {
            miner: Miner::new(difficulty),
        }
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// `hash` meets the difficulty and equals the block's recomputed hash.
    ///
    /// The second half keeps an unrelated or stale hash from standing in as proof.
    pub fn is_valid_proof(&self, block: &Block, hash: &str) -> bool {
        self.miner.meets_difficulty(hash) && hash == block.compute_hash()
    }

    /// Incremental check of `block` against the current tip
    pub fn validate_next(
        &self,
        tip: &Block,
        block: &Block,
        proof: &str,
    ) -> Result<(), ConsensusRejection> {
        if block.previous_hash != tip.hash {
            return Err(ConsensusRejection::PreviousHashMismatch {
                expected: tip.hash.clone(),
                found: block.previous_hash.clone(),
            });
        }

        if block.index != tip.index + 1 {
            return Err(ConsensusRejection::IndexMismatch {
                expected: tip.index + 1,
                found: block.index,
            });
        }

        if !self.is_valid_proof(block, proof) {
            return Err(ConsensusRejection::InvalidProof { index: block.index });
        }

        Ok(())
    }

    /// Validate a complete chain from genesis
    pub fn validate_chain(&self, chain: &[Block]) -> Result<(), ChainError> {
        let genesis = chain.first().ok_or(ChainError::Empty)?;

        if genesis.index != 0 {
            return Err(ChainError::IndexGap {
                position: 0,
                index: genesis.index,
            });
        }
        if !genesis.has_consistent_hash() {
            return Err(ChainError::InvalidGenesis);
        }

        for (position, pair) in chain.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            let position = position + 1;

            if current.index != previous.index + 1 {
                return Err(ChainError::IndexGap {
                    position,
                    index: current.index,
                });
            }
            if current.previous_hash != previous.hash {
                return Err(ChainError::BrokenLink { position });
            }
            if !self.is_valid_proof(current, &current.hash) {
                return Err(ChainError::InvalidProof { position });
            }
        }

        Ok(())
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        self.validate_chain(chain).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    const DIFFICULTY: usize = 1;

    fn mine_on(validator: &ChainValidator, parent: &Block, miner: &str) -> Block {
        let mut block = Block::new(
            parent.index + 1,
            parent.hash.clone(),
            1_700_000_000.0 + parent.index as f64,
            vec![Transaction::reward(miner, 50.0)],
        );
        let result = validator.miner().proof_of_work(&mut block);
        block.hash = result.hash;
        block
    }

    fn build_chain(validator: &ChainValidator, len: usize) -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        while chain.len() < len {
            let next = mine_on(validator, chain.last().unwrap(), "miner");
            chain.push(next);
        }
        chain
    }

    #[test]
    fn test_valid_proof_requires_matching_content() {
        let validator = ChainValidator::new(DIFFICULTY);
        let block = mine_on(&validator, &Block::genesis(), "A");

        assert!(validator.is_valid_proof(&block, &block.hash));

        // A hash with the right prefix but for different content
        let other = mine_on(&validator, &Block::genesis(), "B");
        assert!(!validator.is_valid_proof(&block, &other.hash));
    }

    #[test]
    fn test_validate_next() {
        let validator = ChainValidator::new(DIFFICULTY);
        let genesis = Block::genesis();
        let block = mine_on(&validator, &genesis, "A");

        assert!(validator.validate_next(&genesis, &block, &block.hash).is_ok());

        let mut unlinked = block.clone();
        unlinked.previous_hash = "f".repeat(64);
        assert!(matches!(
            validator.validate_next(&genesis, &unlinked, &unlinked.hash),
            Err(ConsensusRejection::PreviousHashMismatch { .. })
        ));

        assert_eq!(
            validator.validate_next(&genesis, &block, "0bad"),
            Err(ConsensusRejection::InvalidProof { index: 1 })
        );
    }

    #[test]
    fn test_validate_next_index() {
        let validator = ChainValidator::new(DIFFICULTY);
        let genesis = Block::genesis();
        let mut block = Block::new(5, genesis.hash.clone(), 1.0, vec![]);
        let result = validator.miner().proof_of_work(&mut block);

        assert_eq!(
            validator.validate_next(&genesis, &block, &result.hash),
            Err(ConsensusRejection::IndexMismatch {
                expected: 1,
                found: 5
            })
        );
    }

    #[test]
    fn test_validate_chain() {
        let validator = ChainValidator::new(DIFFICULTY);
        let chain = build_chain(&validator, 4);
        assert!(validator.is_valid_chain(&chain));
    }

    #[test]
    fn test_validate_chain_empty() {
        let validator = ChainValidator::new(DIFFICULTY);
        assert_eq!(validator.validate_chain(&[]), Err(ChainError::Empty));
    }

    #[test]
    fn test_validate_chain_tampered_genesis() {
        let validator = ChainValidator::new(DIFFICULTY);
        let mut chain = build_chain(&validator, 2);
        chain[0].timestamp = 99.0;
        assert_eq!(validator.validate_chain(&chain), Err(ChainError::InvalidGenesis));
    }

    #[test]
    fn test_validate_chain_tampered_transaction() {
        let validator = ChainValidator::new(DIFFICULTY);
        let mut chain = build_chain(&validator, 3);
        chain[2].transactions[0].amount = 1_000_000.0;
        assert_eq!(
            validator.validate_chain(&chain),
            Err(ChainError::InvalidProof { position: 2 })
        );
    }

    #[test]
    fn test_validate_chain_broken_link() {
        let validator = ChainValidator::new(DIFFICULTY);
        let mut chain = build_chain(&validator, 2);
        // Valid proof of its own, but built on a different parent
        let mut stray_parent = Block::genesis();
        stray_parent.hash = "1".repeat(64);
        chain.push(mine_on(&validator, &Block { index: 1, ..stray_parent }, "X"));

        assert_eq!(
            validator.validate_chain(&chain),
            Err(ChainError::BrokenLink { position: 2 })
        );
    }
}
