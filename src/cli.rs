// CLI commands

use crate::config::{
    ConsensusParams, NodeConfig, BOOTSTRAP_SPAN, DEFAULT_DIFFICULTY, MINING_REWARD, PORT_BASE,
    STATUS_INTERVAL,
};
use crate::ledger::{Ledger, SharedLedger};
use crate::network::{Node, PeerAddr};
use crate::wallet::Wallet;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "meshchain")]
#[command(about = "Peer-to-peer proof-of-work ledger node", long_about = None)]
pub struct Cli {
    /// Wallet file holding the node key (an ephemeral key is used if omitted)
    #[arg(long, global = true)]
    pub wallet: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a ledger node
    Node(NodeArgs),

    /// Print the wallet address and public key
    Address,
}

#[derive(Args)]
pub struct NodeArgs {
    /// Interface to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Gossip port
    #[arg(short, long, default_value_t = PORT_BASE)]
    pub port: u16,

    /// Host announced to peers (defaults to --host)
    #[arg(long)]
    pub advertise_host: Option<String>,

    /// Bootstrap peer as host:port or port; scans the local port range if none
    #[arg(long = "peer")]
    pub peers: Vec<PeerAddr>,

    /// Leading zero hex digits required in block hashes
    #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Seconds between background synchronizations
    #[arg(long, default_value_t = 30)]
    pub sync_interval: u64,

    /// Mine the pending pool every N seconds
    #[arg(long)]
    pub mine_interval: Option<u64>,

    /// Reward address for mined blocks (defaults to the wallet address)
    #[arg(long)]
    pub miner_address: Option<String>,
}

/// CLI handler
pub struct CliHandler {
    wallet: Wallet,
}

impl CliHandler {
    /// Create a new CLI handler
    pub fn new(wallet_path: Option<&Path>) -> Result<Self, String> {
        let wallet = match wallet_path {
            Some(path) => Wallet::load_or_create(path)?,
            None => Wallet::new(),
        };

        Ok(Self { wallet })
    }

    /// Handle CLI command
    pub async fn handle(&self, cli: Cli) -> Result<(), String> {
        match cli.command {
            Commands::Node(args) => self.run_node(args).await,
            Commands::Address => {
                println!("Address:    {}", self.wallet.derive_address());
                println!("Public key: {}", hex::encode(self.wallet.keypair().pubkey_bytes()));
                Ok(())
            }
        }
    }

    /// Run a node until interrupted
    async fn run_node(&self, args: NodeArgs) -> Result<(), String> {
        let params = ConsensusParams {
            difficulty: args.difficulty,
            mining_reward: MINING_REWARD,
        };

        let mut config = NodeConfig::new(args.host, args.port);
        config.advertise_host = args.advertise_host;
        config.sync_interval = Duration::from_secs(args.sync_interval.max(1));

        let bootstrap = if args.peers.is_empty() {
            bootstrap_peers(args.port)
        } else {
            args.peers
        };

        let ledger = SharedLedger::new(Ledger::new(params));
        let node = Node::start(config, ledger, &bootstrap)
            .await
            .map_err(|e| format!("Failed to start node: {}", e))?;

        let miner_address = args
            .miner_address
            .unwrap_or_else(|| self.wallet.derive_address());

        println!("Node running on {}", node.addr);
        println!("  Difficulty: {}", args.difficulty);
        println!("  Miner address: {}", miner_address);

        tokio::spawn(report_status(node.clone()));
        if let Some(secs) = args.mine_interval {
            tokio::spawn(mine_periodically(
                node.clone(),
                miner_address,
                Duration::from_secs(secs.max(1)),
            ));
        }

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to wait for shutdown signal: {}", e))?;

        let cancelled = node.ledger().cancel_mining().await;
        log::info!("Shutting down ({} mining jobs cancelled)", cancelled);
        Ok(())
    }
}

/// Localhost bootstrap range, excluding our own port
pub fn bootstrap_peers(own_port: u16) -> Vec<PeerAddr> {
    (PORT_BASE..PORT_BASE.saturating_add(BOOTSTRAP_SPAN))
        .filter(|port| *port != own_port)
        .map(PeerAddr::local)
        .collect()
}

async fn report_status(node: Arc<Node>) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    loop {
        ticker.tick().await;
        let peers = node.read_peers().await;
        let chain_len = node.ledger().chain_len().await;
        let peer_list: Vec<String> = peers.iter().map(|peer| peer.to_string()).collect();
        log::info!(
            "Status: {} blocks, {} peers [{}]",
            chain_len,
            peers.len(),
            peer_list.join(", ")
        );
    }
}

async fn mine_periodically(node: Arc<Node>, miner_address: String, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match node.mine(&miner_address).await {
            Ok(Some(block)) => log::info!("Mined block {} ({})", block.index, block.hash),
            Ok(None) => {}
            Err(e) => log::warn!("Mining attempt failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_peers_skip_self() {
        let peers = bootstrap_peers(PORT_BASE + 1);
        assert_eq!(peers.len(), BOOTSTRAP_SPAN as usize - 1);
        assert!(!peers.contains(&PeerAddr::local(PORT_BASE + 1)));
        assert_eq!(peers[0], PeerAddr::local(PORT_BASE));
    }

    #[test]
    fn test_parse_node_command() {
        let cli = Cli::try_parse_from([
            "meshchain",
            "node",
            "--port",
            "6001",
            "--peer",
            "127.0.0.1:6000",
            "--peer",
            "6002",
            "--difficulty",
            "2",
            "--mine-interval",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Node(args) => {
                assert_eq!(args.port, 6001);
                assert_eq!(args.peers, vec![PeerAddr::local(6000), PeerAddr::local(6002)]);
                assert_eq!(args.difficulty, 2);
                assert_eq!(args.mine_interval, Some(5));
                assert_eq!(args.host, "127.0.0.1");
            }
            Commands::Address => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_peer() {
        assert!(Cli::try_parse_from(["meshchain", "node", "--peer", "nowhere"]).is_err());
    }
}
