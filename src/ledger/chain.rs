// Ledger: chain, pending pool and consensus rules

use crate::config::ConsensusParams;
use crate::consensus::{CancelToken, ChainError, ChainValidator, ConsensusRejection, Miner};
use crate::core::{now_timestamp, Block, Transaction};
use crate::ledger::TxPool;

/// Ledger error types
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Malformed transaction fields
    Validation(String),
    /// Sender cannot cover the amount with committed balance minus pending spends
    InsufficientBalance {
        sender: String,
        available: f64,
        requested: f64,
    },
    /// Block refused at the append gate
    Consensus(ConsensusRejection),
    /// Candidate chain failed full validation
    ChainInvalid(ChainError),
    /// Candidate chain is not strictly longer than the local one
    ChainNotLonger { local: usize, remote: usize },
    /// Proof-of-work task died before producing a result
    Mining(String),
}

impl LedgerError {
    /// A rejected network block that suggests the local chain is behind
    pub fn requests_sync(&self) -> bool {
        matches!(
            self,
            LedgerError::Consensus(ConsensusRejection::PreviousHashMismatch { .. })
        )
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LedgerError::Validation(reason) => write!(f, "Invalid transaction: {}", reason),
            LedgerError::InsufficientBalance {
                sender,
                available,
                requested,
            } => write!(
                f,
                "Insufficient balance for {}: {} available, {} requested",
                sender, available, requested
            ),
            LedgerError::Consensus(rejection) => write!(f, "Block rejected: {}", rejection),
            LedgerError::ChainInvalid(reason) => write!(f, "Chain invalid: {}", reason),
            LedgerError::ChainNotLonger { local, remote } => write!(
                f,
                "Distributed chain not longer ({} <= {}), ignored",
                remote, local
            ),
            LedgerError::Mining(reason) => write!(f, "Mining failed: {}", reason),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<ConsensusRejection> for LedgerError {
    fn from(rejection: ConsensusRejection) -> Self {
        LedgerError::Consensus(rejection)
    }
}

impl From<ChainError> for LedgerError {
    fn from(error: ChainError) -> Self {
        LedgerError::ChainInvalid(error)
    }
}

/// Identifies a registered mining job and how many pool entries it includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    id: u64,
    index: u64,
    included: usize,
}

/// A candidate block handed to the miner, detached from the ledger lock
#[derive(Debug)]
pub struct MiningJob {
    pub ticket: JobTicket,
    pub block: Block,
    pub miner: Miner,
    pub cancel: CancelToken,
}

#[derive(Debug)]
struct InFlight {
    ticket: JobTicket,
    cancel: CancelToken,
}

/// Ledger - exclusive owner of the chain and the unconfirmed pool
#[derive(Debug)]
pub struct Ledger {
    params: ConsensusParams,
    validator: ChainValidator,
    chain: Vec<Block>,
    pool: TxPool,
    in_flight: Vec<InFlight>,
    next_job_id: u64,
}

impl Ledger {
    /// Create a ledger holding only the genesis block
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            validator: ChainValidator::new(params.difficulty),
            params,
            chain: vec![Block::genesis()],
            pool: TxPool::new(),
            in_flight: Vec::new(),
            next_job_id: 0,
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Last committed block
    pub fn tip(&self) -> &Block {
        // The chain always starts with genesis and never shrinks below it
        &self.chain[self.chain.len() - 1]
    }

    pub fn pool(&self) -> &TxPool {
        &self.pool
    }

    /// Committed balance of `address`; pending transactions are ignored
    pub fn balance_of(&self, address: &str) -> f64 {
        let mut balance = 0.0;
        for tx in self.chain.iter().flat_map(|block| &block.transactions) {
            if tx.recipient == address {
                balance += tx.amount;
            }
            if tx.sender == address {
                balance -= tx.amount;
            }
        }
        balance
    }

    /// Admit a transaction into the pool.
    ///
    /// Solvency is checked against the committed chain minus what the sender
    /// already has pending here. A conflicting spend admitted by another peer
    /// is not visible until it is mined.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), LedgerError> {
        tx.validate().map_err(LedgerError::Validation)?;

        if !tx.is_reward() {
            let available = self.balance_of(&tx.sender) - self.pool.pending_outflow(&tx.sender);
            if available < tx.amount {
                log::warn!(
                    "Insufficient balance for {} sent by {} ({} available)",
                    tx.amount,
                    tx.sender,
                    available
                );
                return Err(LedgerError::InsufficientBalance {
                    sender: tx.sender,
                    available,
                    requested: tx.amount,
                });
            }
        }

        log::debug!("Transaction admitted: {} -> {} ({})", tx.sender, tx.recipient, tx.amount);
        self.pool.push(tx);
        Ok(())
    }

    /// Build the next candidate block from the pool and register it for cancellation.
    ///
    /// Returns `None` when there is nothing to mine.
    pub fn prepare_block(&mut self, miner_address: &str) -> Option<MiningJob> {
        if self.pool.is_empty() {
            return None;
        }

        let tip = self.tip();
        let mut transactions = self.pool.transactions().to_vec();
        transactions.push(Transaction::reward(miner_address, self.params.mining_reward));
        let block = Block::new(tip.index + 1, tip.hash.clone(), now_timestamp(), transactions);

        let ticket = JobTicket {
            id: self.next_job_id,
            index: block.index,
            included: self.pool.len(),
        };
        self.next_job_id += 1;

        let cancel = CancelToken::new();
        self.in_flight.push(InFlight {
            ticket,
            cancel: cancel.clone(),
        });

        Some(MiningJob {
            ticket,
            block,
            miner: self.validator.miner().clone(),
            cancel,
        })
    }

    /// Commit a block found by the miner for `ticket`
    pub fn complete_block(
        &mut self,
        ticket: JobTicket,
        block: Block,
        proof: String,
    ) -> Result<Block, LedgerError> {
        // Cancelled jobs are dropped from the registry when the competing block commits
        if self.unregister(ticket).is_none() {
            return Err(ConsensusRejection::Superseded { index: ticket.index }.into());
        }

        self.append(block, &proof)?;
        self.pool.drain_front(ticket.included);

        let block = self.tip().clone();
        log::info!("Block {} mined: {}", block.index, block.hash);
        Ok(block)
    }

    /// Drop a job whose search was cancelled
    pub fn abandon_block(&mut self, ticket: JobTicket) -> LedgerError {
        self.unregister(ticket);
        log::info!("Mining of block {} abandoned, a competing block was committed", ticket.index);
        ConsensusRejection::Superseded { index: ticket.index }.into()
    }

    /// Mine the pool synchronously, holding the ledger for the whole search
    pub fn mine(&mut self, miner_address: &str) -> Result<Option<Block>, LedgerError> {
        let Some(MiningJob {
            ticket,
            mut block,
            miner,
            ..
        }) = self.prepare_block(miner_address)
        else {
            log::info!("No transactions to mine");
            return Ok(None);
        };

        let result = miner.proof_of_work(&mut block);
        self.complete_block(ticket, block, result.hash).map(Some)
    }

    /// `hash` meets the difficulty and equals the block's content hash
    pub fn is_valid_proof(&self, block: &Block, hash: &str) -> bool {
        self.validator.is_valid_proof(block, hash)
    }

    /// The single gate for every new block, local or remote
    pub fn append(&mut self, mut block: Block, proof: &str) -> Result<(), LedgerError> {
        self.validator.validate_next(self.tip(), &block, proof)?;

        block.hash = proof.to_string();
        let index = block.index;
        self.chain.push(block);
        self.cancel_jobs_up_to(index);
        Ok(())
    }

    /// Append a block delivered by a peer and prune what it committed from the pool.
    ///
    /// A `PreviousHashMismatch` error means the caller should synchronize.
    pub fn accept_from_network(&mut self, block: Block) -> Result<(), LedgerError> {
        let proof = block.hash.clone();
        let index = block.index;

        if let Err(e) = self.append(block, &proof) {
            log::warn!("Block {} from network rejected: {}", index, e);
            return Err(e);
        }

        let committed = &self.chain[self.chain.len() - 1].transactions;
        let pruned = self.pool.prune_committed(committed);
        log::info!("Block {} added from network ({} pending pruned)", index, pruned);
        Ok(())
    }

    /// Full validation of a candidate chain from genesis
    pub fn validate_full_chain(&self, candidate: &[Block]) -> Result<(), ChainError> {
        self.validator.validate_chain(candidate)
    }

    pub fn is_valid_full_chain(&self, candidate: &[Block]) -> bool {
        self.validator.is_valid_chain(candidate)
    }

    /// Longest-valid-chain rule: adopt `candidate` only if strictly longer and valid
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), LedgerError> {
        if candidate.len() <= self.chain.len() {
            return Err(LedgerError::ChainNotLonger {
                local: self.chain.len(),
                remote: candidate.len(),
            });
        }

        self.validate_full_chain(&candidate)?;

        log::info!(
            "Local chain replaced: {} -> {} blocks",
            self.chain.len(),
            candidate.len()
        );
        self.chain = candidate;
        self.pool.clear();
        self.cancel_jobs_up_to(u64::MAX);
        Ok(())
    }

    /// Number of registered proof-of-work searches
    pub fn mining_jobs(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancel every in-flight search
    pub fn cancel_mining(&mut self) -> usize {
        let count = self.in_flight.len();
        self.cancel_jobs_up_to(u64::MAX);
        count
    }

    fn unregister(&mut self, ticket: JobTicket) -> Option<InFlight> {
        let position = self.in_flight.iter().position(|job| job.ticket == ticket)?;
        Some(self.in_flight.swap_remove(position))
    }

    /// Cancel in-flight mining for every index a committed block has claimed
    fn cancel_jobs_up_to(&mut self, index: u64) {
        self.in_flight.retain(|job| {
            if job.ticket.index <= index {
                job.cancel.cancel();
                false
            } else {
                true
            }
        });
    }
}
