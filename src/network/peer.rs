// Peer addressing, peer table and per-connection I/O

use crate::network::message::{may_complete, parse_frame, Framing};
use crate::network::Message;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// Host used for peers announced by port only
pub const DEFAULT_PEER_HOST: &str = "127.0.0.1";

/// Network error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Could not open a connection
    Connect(String),
    /// Connect or read exceeded the peer timeout
    Timeout,
    /// Read/write failure on an open connection
    Io(String),
    /// Payload is not valid JSON or does not match the schema
    Decode(String),
    /// Well-formed message with a `type` this node does not speak
    UnknownMessage(String),
    /// Peer answered with the wrong message kind
    UnexpectedResponse(String),
    /// Peer answered with an `ERROR` message
    Remote(String),
    /// Message exceeded the size cap
    TooLarge(usize),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::Connect(e) => write!(f, "Failed to connect: {}", e),
            NetworkError::Timeout => write!(f, "Peer timed out"),
            NetworkError::Io(e) => write!(f, "I/O error: {}", e),
            NetworkError::Decode(e) => write!(f, "Invalid message: {}", e),
            NetworkError::UnknownMessage(t) => write!(f, "Unknown message type: {}", t),
            NetworkError::UnexpectedResponse(t) => write!(f, "Unexpected response: {}", t),
            NetworkError::Remote(e) => write!(f, "Peer error: {}", e),
            NetworkError::TooLarge(limit) => write!(f, "Message exceeds {} bytes", limit),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Address of a peer's gossip listener
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Localhost peer identified by port only
    pub fn local(port: u16) -> Self {
        Self::new(DEFAULT_PEER_HOST, port)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = String;

    /// Accepts `host:port` or a bare port
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(port) = s.parse::<u16>() {
            return Ok(Self::local(port));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid peer address: {}", s))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("Invalid peer port in {}: {}", s, e))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("Invalid peer address: {}", s));
        }
        Ok(Self::new(host, port))
    }
}

impl Serialize for PeerAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Port(u16),
            Addr(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Port(port) => Ok(PeerAddr::local(port)),
            Raw::Addr(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Set of known peers, grown by merge and never pruned
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: Arc<RwLock<BTreeSet<PeerAddr>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one peer, returns whether it was new
    pub async fn insert(&self, peer: PeerAddr) -> bool {
        self.peers.write().await.insert(peer)
    }

    /// Merge a discovered peer list, skipping `own` address.
    ///
    /// Returns the peers that were not known before.
    pub async fn merge(&self, discovered: &[PeerAddr], own: &PeerAddr) -> Vec<PeerAddr> {
        let mut peers = self.peers.write().await;
        discovered
            .iter()
            .filter(|peer| *peer != own)
            .filter(|peer| peers.insert((*peer).clone()))
            .cloned()
            .collect()
    }

    pub async fn contains(&self, peer: &PeerAddr) -> bool {
        self.peers.read().await.contains(peer)
    }

    pub async fn list(&self) -> Vec<PeerAddr> {
        self.peers.read().await.iter().cloned().collect()
    }
}

/// Peer connection, one request/response exchange per instance
pub struct Peer {
    pub addr: PeerAddr,
    stream: TcpStream,
    read_timeout: Duration,
}

impl Peer {
    /// Create a new peer from a TCP stream
    pub fn new(stream: TcpStream, addr: PeerAddr, read_timeout: Duration) -> Self {
        Self {
            addr,
            stream,
            read_timeout,
        }
    }

    /// Connect to a peer
    pub async fn connect(addr: &PeerAddr, connect_timeout: Duration) -> Result<Self, NetworkError> {
        let stream = timeout(
            connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await
        .map_err(|_| NetworkError::Timeout)?
        .map_err(|e| NetworkError::Connect(e.to_string()))?;

        Ok(Self::new(stream, addr.clone(), connect_timeout))
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &Message) -> Result<(), NetworkError> {
        self.send_raw(&message.serialize()).await
    }

    /// Write raw bytes and flush
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), NetworkError> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| NetworkError::Io(e.to_string()))?;

        self.stream
            .flush()
            .await
            .map_err(|e| NetworkError::Io(e.to_string()))
    }

    /// Receive one JSON message, reading until the value is complete.
    ///
    /// The buffer is re-parsed only after a chunk that could close it.
    pub async fn receive_message(&mut self, limit: usize) -> Result<Message, NetworkError> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let read = self.read_chunk(&mut chunk).await?;
            if read == 0 {
                return match parse_frame(&buffer)? {
                    Framing::Complete(value) => Message::from_value(value),
                    Framing::Incomplete if buffer.is_empty() => {
                        Err(NetworkError::Io("connection closed".to_string()))
                    }
                    Framing::Incomplete => {
                        Err(NetworkError::Decode("truncated message".to_string()))
                    }
                };
            }

            buffer.extend_from_slice(&chunk[..read]);
            if buffer.len() > limit {
                return Err(NetworkError::TooLarge(limit));
            }

            if !may_complete(&chunk[..read]) {
                continue;
            }
            if let Framing::Complete(value) = parse_frame(&buffer)? {
                return Message::from_value(value);
            }
        }
    }

    /// Read until the peer closes the connection
    pub async fn receive_to_end(&mut self, limit: usize) -> Result<Vec<u8>, NetworkError> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 16 * 1024];

        loop {
            let read = self.read_chunk(&mut chunk).await?;
            if read == 0 {
                return Ok(buffer);
            }
            buffer.extend_from_slice(&chunk[..read]);
            if buffer.len() > limit {
                return Err(NetworkError::TooLarge(limit));
            }
        }
    }

    /// Close the write half so the peer sees end-of-message
    pub async fn shutdown(&mut self) -> Result<(), NetworkError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| NetworkError::Io(e.to_string()))
    }

    async fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<usize, NetworkError> {
        timeout(self.read_timeout, self.stream.read(chunk))
            .await
            .map_err(|_| NetworkError::Timeout)?
            .map_err(|e| NetworkError::Io(e.to_string()))
    }
}
