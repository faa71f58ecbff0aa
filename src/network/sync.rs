// Chain synchronization: longest valid chain wins

use crate::network::{Node, PeerAddr};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

impl Node {
    /// Synchronize against every known peer
    pub async fn synchronize(&self) -> bool {
        let peers = self.peers.list().await;
        self.synchronize_with(&peers).await
    }

    /// Ask each peer for its chain in turn and adopt the first one that is
    /// strictly longer than ours and valid.
    ///
    /// Returns whether the local chain was replaced. Passes run one at a
    /// time; a request arriving mid-pass waits for it to finish.
    pub async fn synchronize_with(&self, peers: &[PeerAddr]) -> bool {
        let _guard = self.sync_guard.lock().await;

        for peer in peers {
            let candidate = match self.request_chain(peer).await {
                Ok(chain) => chain,
                Err(e) => {
                    log::warn!("Failed to fetch chain from {}: {}", peer, e);
                    continue;
                }
            };

            let local = self.ledger.chain_len().await;
            if candidate.len() <= local {
                log::debug!(
                    "Chain from {} is not longer ({} <= {})",
                    peer,
                    candidate.len(),
                    local
                );
                continue;
            }

            let length = candidate.len();
            match self.ledger.replace_chain(candidate).await {
                Ok(()) => {
                    log::info!("Adopted chain of length {} from {}", length, peer);
                    return true;
                }
                Err(e) => log::warn!("Rejected chain from {}: {}", peer, e),
            }
        }

        false
    }

    /// Run `synchronize` every `sync_interval`, first run one period from now
    pub fn spawn_periodic_sync(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sync_interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.synchronize().await;
            }
        })
    }
}
