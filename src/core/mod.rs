// Core ledger data structures

mod transaction;
mod block;
mod hash;

pub use transaction::*;
pub use block::*;
pub use hash::*;
