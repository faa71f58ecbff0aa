// Protocol constants and node configuration

use std::time::Duration;

/// Leading zero hex characters required in a block hash
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Amount minted to the miner of each block
pub const MINING_REWARD: f64 = 50.0;

/// Connect and read timeout for every gossip exchange
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// First port of the localhost bootstrap range
pub const PORT_BASE: u16 = 5000;

/// Number of ports scanned from `PORT_BASE` when no peers are given
pub const BOOTSTRAP_SPAN: u16 = 5;

/// Period of the background synchronization task
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Period of the status log line
pub const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Largest single request/response message accepted
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Largest chain transfer accepted
pub const MAX_CHAIN_BYTES: usize = 64 * 1024 * 1024;

/// Consensus parameters shared by every node of a network
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusParams {
    pub difficulty: usize,
    pub mining_reward: f64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: MINING_REWARD,
        }
    }
}

/// Gossip node settings
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind, 0 picks an ephemeral port
    pub port: u16,
    /// Host announced to peers, defaults to `host`
    pub advertise_host: Option<String>,
    pub peer_timeout: Duration,
    pub sync_interval: Duration,
}

impl NodeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Host peers should dial to reach this node
    pub fn advertised_host(&self) -> &str {
        self.advertise_host.as_deref().unwrap_or(&self.host)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: PORT_BASE,
            advertise_host: None,
            peer_timeout: PEER_TIMEOUT,
            sync_interval: SYNC_INTERVAL,
        }
    }
}
