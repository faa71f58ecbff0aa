// Shared ledger handle: one lock around chain + pool

use crate::core::{Block, Transaction};
use crate::ledger::{Ledger, LedgerError, MiningJob};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Cloneable handle to the node's single ledger.
///
/// Every mutation takes the write lock, so a network block and a locally mined
/// block can never both land on the same tip. Proof-of-work runs outside the
/// lock on the blocking pool.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    /// Shared read access for queries
    pub async fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.inner.read().await
    }

    pub async fn chain(&self) -> Vec<Block> {
        self.inner.read().await.chain().to_vec()
    }

    pub async fn chain_len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn balance_of(&self, address: &str) -> f64 {
        self.inner.read().await.balance_of(address)
    }

    pub async fn pending(&self) -> Vec<Transaction> {
        self.inner.read().await.pool().transactions().to_vec()
    }

    pub async fn add_transaction(&self, tx: Transaction) -> Result<(), LedgerError> {
        self.inner.write().await.add_transaction(tx)
    }

    pub async fn append(&self, block: Block, proof: &str) -> Result<(), LedgerError> {
        self.inner.write().await.append(block, proof)
    }

    pub async fn accept_from_network(&self, block: Block) -> Result<(), LedgerError> {
        self.inner.write().await.accept_from_network(block)
    }

    pub async fn replace_chain(&self, candidate: Vec<Block>) -> Result<(), LedgerError> {
        self.inner.write().await.replace_chain(candidate)
    }

    /// Abort every proof-of-work search in flight, returns how many were cancelled
    pub async fn cancel_mining(&self) -> usize {
        self.inner.write().await.cancel_mining()
    }

    /// Mine the current pool into a block.
    ///
    /// `Ok(None)` when the pool is empty. If a competing block is committed
    /// while the search runs, the search is cancelled and
    /// `ConsensusRejection::Superseded` is returned.
    pub async fn mine(&self, miner_address: &str) -> Result<Option<Block>, LedgerError> {
        let Some(MiningJob {
            ticket,
            mut block,
            miner,
            cancel,
        }) = self.inner.write().await.prepare_block(miner_address)
        else {
            log::debug!("No transactions to mine");
            return Ok(None);
        };

        log::info!(
            "Mining block {} with {} transactions",
            block.index,
            block.transactions.len()
        );

        let search = tokio::task::spawn_blocking(move || {
            let result = miner.mine(&mut block, &cancel);
            (block, result)
        })
        .await;

        let mut ledger = self.inner.write().await;
        match search {
            Ok((block, Some(result))) => {
                log::debug!(
                    "Proof found after {} attempts in {:?} ({:.0} H/s)",
                    result.attempts,
                    result.duration,
                    result.hash_rate()
                );
                ledger.complete_block(ticket, block, result.hash).map(Some)
            }
            Ok((_, None)) => Err(ledger.abandon_block(ticket)),
            Err(e) => {
                ledger.abandon_block(ticket);
                Err(LedgerError::Mining(e.to_string()))
            }
        }
    }
}
