// Network protocol messages

use crate::core::{Block, Transaction};
use crate::network::{NetworkError, PeerAddr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    NewPeer,
    GetPeers,
    NewTransaction,
    NewBlock,
    GetChain,
    Peers,
    Ack,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NewPeer => "NEW_PEER",
            MessageType::GetPeers => "GET_PEERS",
            MessageType::NewTransaction => "NEW_TRANSACTION",
            MessageType::NewBlock => "NEW_BLOCK",
            MessageType::GetChain => "GET_CHAIN",
            MessageType::Peers => "PEERS",
            MessageType::Ack => "ACK",
            MessageType::Error => "ERROR",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "NEW_PEER" => Some(MessageType::NewPeer),
            "GET_PEERS" => Some(MessageType::GetPeers),
            "NEW_TRANSACTION" => Some(MessageType::NewTransaction),
            "NEW_BLOCK" => Some(MessageType::NewBlock),
            "GET_CHAIN" => Some(MessageType::GetChain),
            "PEERS" => Some(MessageType::Peers),
            "ACK" => Some(MessageType::Ack),
            "ERROR" => Some(MessageType::Error),
            _ => None,
        }
    }
}

/// Network message, one JSON object tagged by `type`.
///
/// `GET_CHAIN` is answered with a bare JSON array of blocks rather than a
/// `Message`, terminated by the server closing the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Announce the sender's listening address
    NewPeer {
        port: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
    GetPeers,
    NewTransaction {
        #[serde(deserialize_with = "Transaction::deserialize_lenient")]
        transaction: Transaction,
    },
    NewBlock { block: Block },
    GetChain,
    Peers { peers: Vec<PeerAddr> },
    Ack { message: String },
    Error { message: String },
}

impl Message {
    /// Get message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::NewPeer { .. } => MessageType::NewPeer,
            Message::GetPeers => MessageType::GetPeers,
            Message::NewTransaction { .. } => MessageType::NewTransaction,
            Message::NewBlock { .. } => MessageType::NewBlock,
            Message::GetChain => MessageType::GetChain,
            Message::Peers { .. } => MessageType::Peers,
            Message::Ack { .. } => MessageType::Ack,
            Message::Error { .. } => MessageType::Error,
        }
    }

    pub fn ack(message: impl Into<String>) -> Self {
        Message::Ack {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::Error {
            message: message.into(),
        }
    }

    /// Serialize message to bytes
    pub fn serialize(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("messages always serialize to JSON")
    }

    /// Decode a JSON value, separating unknown types from malformed payloads
    pub fn from_value(value: Value) -> Result<Self, NetworkError> {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| NetworkError::Decode("missing message type".to_string()))?;

        if MessageType::from_string(type_name).is_none() {
            return Err(NetworkError::UnknownMessage(type_name.to_string()));
        }

        serde_json::from_value(value).map_err(|e| NetworkError::Decode(e.to_string()))
    }

    /// Deserialize message from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self, NetworkError> {
        let value: Value =
            serde_json::from_slice(data).map_err(|e| NetworkError::Decode(e.to_string()))?;
        Self::from_value(value)
    }
}

/// Result of feeding buffered bytes to the incremental JSON reader
#[derive(Debug)]
pub enum Framing {
    /// A complete value was parsed
    Complete(Value),
    /// The buffer ends mid-value; read more
    Incomplete,
}

/// Try to parse one whole JSON value from `buffer`.
///
/// Messages carry no length prefix, so the reader keeps appending bytes until
/// the buffer holds a complete value.
pub fn parse_frame(buffer: &[u8]) -> Result<Framing, NetworkError> {
    match serde_json::from_slice::<Value>(buffer) {
        Ok(value) => Ok(Framing::Complete(value)),
        Err(e) if e.is_eof() => Ok(Framing::Incomplete),
        Err(e) => Err(NetworkError::Decode(e.to_string())),
    }
}

/// Whether a newly read chunk could complete a buffered value.
///
/// A JSON object or array can only end on a closing bracket, so chunks
/// without one skip the re-parse.
pub fn may_complete(chunk: &[u8]) -> bool {
    chunk.iter().any(|b| *b == b'}' || *b == b']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::NewPeer.as_str(), "NEW_PEER");
        assert_eq!(MessageType::from_string("GET_CHAIN"), Some(MessageType::GetChain));
        assert_eq!(MessageType::from_string("get_chain"), None);
    }

    #[test]
    fn test_wire_shapes() {
        let value = serde_json::to_value(Message::NewPeer {
            port: 5001,
            host: None,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "NEW_PEER", "port": 5001}));

        let value = serde_json::to_value(Message::GetChain).unwrap();
        assert_eq!(value, json!({"type": "GET_CHAIN"}));

        let value = serde_json::to_value(Message::ack("ok")).unwrap();
        assert_eq!(value, json!({"type": "ACK", "message": "ok"}));
    }

    #[test]
    fn test_type_tag_matches_message_type() {
        let messages = [
            Message::GetPeers,
            Message::NewTransaction {
                transaction: Transaction::new("A", "B", 1.0),
            },
            Message::NewBlock {
                block: Block::genesis(),
            },
            Message::Peers { peers: vec![] },
            Message::error("boom"),
        ];
        for message in messages {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["type"], message.message_type().as_str());
        }
    }

    #[test]
    fn test_decode_new_block() {
        let genesis = Block::genesis();
        let data = Message::NewBlock {
            block: genesis.clone(),
        }
        .serialize();

        match Message::deserialize(&data).unwrap() {
            Message::NewBlock { block } => {
                assert_eq!(block, genesis);
                assert_eq!(block.compute_hash(), genesis.hash);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_decode_transaction_string_amount() {
        let message = Message::deserialize(
            br#"{"type":"NEW_TRANSACTION","transaction":{"sender":"A","recipient":"B","amount":"2.5"}}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            Message::NewTransaction {
                transaction: Transaction::new("A", "B", 2.5)
            }
        );

        assert!(matches!(
            Message::deserialize(
                br#"{"type":"NEW_TRANSACTION","transaction":{"sender":"A","recipient":"B","amount":-1}}"#
            ),
            Err(NetworkError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_port_only_peer_list() {
        let message = Message::deserialize(br#"{"type":"PEERS","peers":[5001,5002]}"#).unwrap();
        assert_eq!(
            message,
            Message::Peers {
                peers: vec![
                    PeerAddr::new("127.0.0.1", 5001),
                    PeerAddr::new("127.0.0.1", 5002)
                ]
            }
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Message::deserialize(br#"{"type":"PING"}"#),
            Err(NetworkError::UnknownMessage(t)) if t == "PING"
        ));
        assert!(matches!(
            Message::deserialize(br#"{"port":1}"#),
            Err(NetworkError::Decode(_))
        ));
        assert!(matches!(
            Message::deserialize(br#"{"type":"NEW_PEER","port":"x"}"#),
            Err(NetworkError::Decode(_))
        ));
        assert!(matches!(
            Message::deserialize(b"not json"),
            Err(NetworkError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_frame() {
        let data = Message::GetPeers.serialize();
        let (head, _) = data.split_at(data.len() - 1);

        assert!(matches!(parse_frame(head), Ok(Framing::Incomplete)));
        assert!(matches!(parse_frame(&data), Ok(Framing::Complete(_))));
        assert!(matches!(parse_frame(b"{]"), Err(NetworkError::Decode(_))));
    }

    #[test]
    fn test_may_complete() {
        assert!(may_complete(b"\"x\"}"));
        assert!(may_complete(b"5001]}"));
        assert!(!may_complete(b"{\"type\":\"PEERS\",\"peers\":[50"));
        assert!(!may_complete(b""));
    }
}
