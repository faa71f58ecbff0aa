// P2P gossip networking

mod message;
mod node;
mod peer;
mod sync;

pub use message::{Message, MessageType};
pub use node::Node;
pub use peer::{NetworkError, Peer, PeerAddr, PeerTable, DEFAULT_PEER_HOST};
