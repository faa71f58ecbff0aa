// Meshchain: a small peer-to-peer proof-of-work ledger

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod ledger;
pub mod network;
pub mod wallet;

// Re-exports for convenience
pub use crate::cli::{Cli, CliHandler};
pub use crate::config::{ConsensusParams, NodeConfig};
pub use crate::consensus::{CancelToken, ChainError, ChainValidator, ConsensusRejection, Miner};
pub use crate::core::{Block, Transaction};
pub use crate::ledger::{Ledger, LedgerError, SharedLedger, TxPool};
pub use crate::network::{Message, NetworkError, Node, PeerAddr, PeerTable};
pub use crate::wallet::{KeyPair, Wallet};
