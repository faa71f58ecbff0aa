// Ledger: chain state, pending pool and the lock around them

mod chain;
mod pool;
mod shared;

pub use chain::{JobTicket, Ledger, LedgerError, MiningJob};
pub use pool::TxPool;
pub use shared::SharedLedger;
