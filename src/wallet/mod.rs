// Node identity and key management

mod keystore;

pub use keystore::{KeyPair, Wallet};
