// Network node - gossip server, outbound operations and the node-facing API

use crate::config::{NodeConfig, MAX_CHAIN_BYTES, MAX_MESSAGE_BYTES};
use crate::core::{Block, Transaction};
use crate::ledger::{LedgerError, SharedLedger};
use crate::network::{Message, NetworkError, Peer, PeerAddr, PeerTable};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// A running ledger node.
///
/// This is the single context object shared by every connection handler,
/// the synchronization task and the front-end caller.
pub struct Node {
    /// Address announced to peers
    pub addr: PeerAddr,
    pub config: NodeConfig,
    pub(crate) ledger: SharedLedger,
    pub(crate) peers: PeerTable,
    /// Held while a synchronization pass runs
    pub(crate) sync_guard: Mutex<()>,
}

impl Node {
    /// Bind the gossip listener and build the node around it
    pub async fn bind(
        config: NodeConfig,
        ledger: SharedLedger,
    ) -> Result<(Arc<Self>, TcpListener), NetworkError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| NetworkError::Connect(format!("Failed to bind: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| NetworkError::Io(e.to_string()))?
            .port();

        let addr = PeerAddr::new(config.advertised_host(), port);
        log::info!("Node listening on {}", addr);

        let node = Self {
            addr,
            config,
            ledger,
            peers: PeerTable::new(),
            sync_guard: Mutex::new(()),
        };
        Ok((Arc::new(node), listener))
    }

    /// Bind, serve, join the mesh through `bootstrap`, synchronize once and
    /// keep synchronizing in the background
    pub async fn start(
        config: NodeConfig,
        ledger: SharedLedger,
        bootstrap: &[PeerAddr],
    ) -> Result<Arc<Self>, NetworkError> {
        let (node, listener) = Self::bind(config, ledger).await?;
        tokio::spawn(node.clone().serve(listener));

        node.discover(bootstrap).await;
        node.synchronize().await;
        node.clone().spawn_periodic_sync();

        Ok(node)
    }

    /// Accept loop: one task per inbound connection
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    log::debug!("New connection from {}", remote);
                    let node = self.clone();
                    tokio::spawn(async move { node.handle_connection(stream, remote).await });
                }
                Err(e) => {
                    log::error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Handle one inbound exchange
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let from = PeerAddr::new(remote.ip().to_string(), remote.port());
        let mut peer = Peer::new(stream, from, self.config.peer_timeout);

        let message = match peer.receive_message(MAX_MESSAGE_BYTES).await {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Bad message from {}: {}", remote, e);
                if let Err(e) = peer.send_message(&Message::error(e.to_string())).await {
                    log::debug!("Failed to report error to {}: {}", remote, e);
                }
                return;
            }
        };

        log::debug!(
            "Received message from {}: {}",
            remote,
            message.message_type().as_str()
        );

        let result = match message {
            Message::GetChain => self.send_chain(&mut peer).await,
            request => {
                let response = self.dispatch(request, remote.ip()).await;
                peer.send_message(&response).await
            }
        };

        if let Err(e) = result {
            log::warn!("Failed to answer {}: {}", remote, e);
        }
    }

    /// Apply a request and build its response
    async fn dispatch(self: &Arc<Self>, message: Message, remote_ip: IpAddr) -> Message {
        match message {
            Message::NewPeer { port, host } => {
                let announcer = PeerAddr::new(host.unwrap_or_else(|| remote_ip.to_string()), port);
                let is_new = announcer != self.addr && self.peers.insert(announcer.clone()).await;
                let peers = self.peers.list().await;

                if is_new {
                    log::info!("New peer {}", announcer);
                    self.spawn_fan_out(&peers, announcer);
                }
                Message::Peers { peers }
            }
            Message::GetPeers => Message::Peers {
                peers: self.peers.list().await,
            },
            Message::NewTransaction { transaction } => {
                match self.ledger.add_transaction(transaction).await {
                    Ok(()) => Message::ack("Transaction added"),
                    Err(e) => {
                        log::info!("Transaction from network rejected: {}", e);
                        Message::ack(format!("Transaction rejected: {}", e))
                    }
                }
            }
            Message::NewBlock { block } => match self.ledger.accept_from_network(block).await {
                Ok(()) => Message::ack("Block added"),
                Err(e) if e.requests_sync() => {
                    let node = self.clone();
                    tokio::spawn(async move {
                        if node.synchronize().await {
                            log::info!("Chain synchronized after block rejection");
                        }
                    });
                    Message::ack(format!("Block rejected, synchronizing: {}", e))
                }
                Err(e) => Message::ack(format!("Block rejected: {}", e)),
            },
            other => {
                Message::error(format!("Unexpected message type: {}", other.message_type().as_str()))
            }
        }
    }

    /// Dial every listed peer except ourselves and the announcer.
    ///
    /// Only runs for announcers not seen before, so the mesh settles once
    /// every table is complete.
    fn spawn_fan_out(self: &Arc<Self>, peers: &[PeerAddr], announcer: PeerAddr) {
        let targets: Vec<PeerAddr> = peers
            .iter()
            .filter(|peer| **peer != self.addr && **peer != announcer)
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }

        let node = self.clone();
        tokio::spawn(async move {
            for target in targets {
                if let Err(e) = node.connect_to_peer(&target).await {
                    log::warn!("Failed to connect to peer {}: {}", target, e);
                }
            }
        });
    }

    /// Stream the full chain as a JSON array, then close
    async fn send_chain(&self, peer: &mut Peer) -> Result<(), NetworkError> {
        let chain = self.ledger.chain().await;
        let data = serde_json::to_vec(&chain).map_err(|e| NetworkError::Decode(e.to_string()))?;
        peer.send_raw(&data).await?;
        peer.shutdown().await
    }

    /// One request/response round trip over a fresh connection
    async fn exchange(&self, addr: &PeerAddr, message: &Message) -> Result<Message, NetworkError> {
        let mut peer = Peer::connect(addr, self.config.peer_timeout).await?;
        peer.send_message(message).await?;
        match peer.receive_message(MAX_MESSAGE_BYTES).await? {
            Message::Error { message } => Err(NetworkError::Remote(message)),
            response => Ok(response),
        }
    }

    /// Announce ourselves to `addr` and merge its peer list.
    ///
    /// Returns the peers learned from this exchange, `addr` included when new.
    pub async fn connect_to_peer(&self, addr: &PeerAddr) -> Result<Vec<PeerAddr>, NetworkError> {
        let announce = Message::NewPeer {
            port: self.addr.port,
            host: Some(self.addr.host.clone()),
        };

        match self.exchange(addr, &announce).await? {
            Message::Peers { peers } => {
                let mut learned = Vec::new();
                if self.peers.insert(addr.clone()).await {
                    learned.push(addr.clone());
                }
                learned.extend(self.peers.merge(&peers, &self.addr).await);
                log::info!("Connected to peer {} ({} peers learned)", addr, learned.len());
                Ok(learned)
            }
            other => Err(NetworkError::UnexpectedResponse(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    /// Announce to the seeds and to every peer they reveal, transitively
    pub async fn discover(&self, seeds: &[PeerAddr]) {
        let mut queue: VecDeque<PeerAddr> = seeds.iter().cloned().collect();
        let mut visited = BTreeSet::new();

        while let Some(addr) = queue.pop_front() {
            if addr == self.addr || !visited.insert(addr.clone()) {
                continue;
            }
            match self.connect_to_peer(&addr).await {
                Ok(learned) => queue.extend(learned),
                Err(e) => log::warn!("Failed to connect to peer {}: {}", addr, e),
            }
        }
    }

    /// Ask `addr` for its peer list and merge it
    pub async fn request_peers(&self, addr: &PeerAddr) -> Result<Vec<PeerAddr>, NetworkError> {
        match self.exchange(addr, &Message::GetPeers).await? {
            Message::Peers { peers } => {
                self.peers.merge(&peers, &self.addr).await;
                Ok(peers)
            }
            other => Err(NetworkError::UnexpectedResponse(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    /// Push a transaction, returns the peer's acknowledgement text
    pub async fn send_transaction(
        &self,
        addr: &PeerAddr,
        transaction: &Transaction,
    ) -> Result<String, NetworkError> {
        let message = Message::NewTransaction {
            transaction: transaction.clone(),
        };
        Self::expect_ack(self.exchange(addr, &message).await?)
    }

    /// Push a block, returns the peer's acknowledgement text
    pub async fn send_block(&self, addr: &PeerAddr, block: &Block) -> Result<String, NetworkError> {
        let message = Message::NewBlock {
            block: block.clone(),
        };
        Self::expect_ack(self.exchange(addr, &message).await?)
    }

    /// Fetch a peer's full chain, reading until the peer closes
    pub async fn request_chain(&self, addr: &PeerAddr) -> Result<Vec<Block>, NetworkError> {
        let mut peer = Peer::connect(addr, self.config.peer_timeout).await?;
        peer.send_message(&Message::GetChain).await?;
        let data = peer.receive_to_end(MAX_CHAIN_BYTES).await?;

        let value: Value =
            serde_json::from_slice(&data).map_err(|e| NetworkError::Decode(e.to_string()))?;
        if value.is_array() {
            return serde_json::from_value(value).map_err(|e| NetworkError::Decode(e.to_string()));
        }

        match Message::from_value(value)? {
            Message::Error { message } => Err(NetworkError::Remote(message)),
            other => Err(NetworkError::UnexpectedResponse(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    fn expect_ack(response: Message) -> Result<String, NetworkError> {
        match response {
            Message::Ack { message } => Ok(message),
            other => Err(NetworkError::UnexpectedResponse(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    /// Broadcast a block to all peers, returns how many acknowledged
    pub async fn broadcast_block(&self, block: &Block) -> usize {
        let peers = self.peers.list().await;
        log::info!("Broadcasting block {} to {} peers", block.index, peers.len());

        let mut delivered = 0;
        for peer in &peers {
            match self.send_block(peer, block).await {
                Ok(ack) => {
                    log::debug!("{} acknowledged block {}: {}", peer, block.index, ack);
                    delivered += 1;
                }
                Err(e) => log::warn!("Failed to send block to peer {}: {}", peer, e),
            }
        }
        delivered
    }

    /// Broadcast a transaction to all peers, returns how many acknowledged
    pub async fn broadcast_transaction(&self, transaction: &Transaction) -> usize {
        let peers = self.peers.list().await;
        log::info!("Broadcasting transaction to {} peers", peers.len());

        let mut delivered = 0;
        for peer in &peers {
            match self.send_transaction(peer, transaction).await {
                Ok(_) => delivered += 1,
                Err(e) => log::warn!("Failed to send transaction to peer {}: {}", peer, e),
            }
        }
        delivered
    }

    /// Admit a transaction locally and gossip it
    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.ledger.add_transaction(transaction.clone()).await?;
        self.broadcast_transaction(&transaction).await;
        Ok(())
    }

    /// Mine the pending pool and gossip the block; `Ok(None)` if nothing to mine
    pub async fn mine(&self, miner_address: &str) -> Result<Option<Block>, LedgerError> {
        let block = self.ledger.mine(miner_address).await?;
        if let Some(block) = &block {
            self.broadcast_block(block).await;
        }
        Ok(block)
    }

    pub async fn read_chain(&self) -> Vec<Block> {
        self.ledger.chain().await
    }

    pub async fn read_peers(&self) -> Vec<PeerAddr> {
        self.peers.list().await
    }

    pub async fn balance_of(&self, address: &str) -> f64 {
        self.ledger.balance_of(address).await
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }
}
