// Consensus and validation logic

pub mod pow;
pub mod validation;

pub use pow::{CancelToken, Miner, MiningResult};
pub use validation::{ChainError, ChainValidator, ConsensusRejection};
