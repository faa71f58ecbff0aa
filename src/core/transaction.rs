// Transaction data structures

use crate::core::content_hash;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sender value that marks a block-reward mint
pub const NETWORK_SENDER: &str = "Network";

/// A transfer of `amount` from `sender` to `recipient`.
///
/// Transactions carry no signature; admission is decided by the ledger's
/// balance check alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Create a block-reward transaction paying `miner_address`
    pub fn reward(miner_address: impl Into<String>, amount: f64) -> Self {
        Self::new(NETWORK_SENDER, miner_address, amount)
    }

    /// Whether this transaction mints new coins
    pub fn is_reward(&self) -> bool {
        self.sender == NETWORK_SENDER
    }

    /// Hash over `{amount, recipient, sender}` with sorted keys
    pub fn content_hash(&self) -> String {
        content_hash(self)
    }

    /// Check field well-formedness
    pub fn validate(&self) -> Result<(), String> {
        if self.sender.trim().is_empty() {
            return Err("sender must not be empty".to_string());
        }
        if self.recipient.trim().is_empty() {
            return Err("recipient must not be empty".to_string());
        }
        if !self.amount.is_finite() {
            return Err(format!("amount {} is not a finite number", self.amount));
        }
        if self.amount <= 0.0 {
            return Err(format!("amount {} must be positive", self.amount));
        }
        Ok(())
    }

    /// Build a transaction from loosely typed front-end input.
    ///
    /// Accepts a numeric or numeric-string `amount`.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "transaction must be a JSON object".to_string())?;

        let field = |name: &str| {
            object
                .get(name)
                .ok_or_else(|| format!("missing field: {}", name))
        };

        let sender = field("sender")?
            .as_str()
            .ok_or_else(|| "sender must be a string".to_string())?;
        let recipient = field("recipient")?
            .as_str()
            .ok_or_else(|| "recipient must be a string".to_string())?;
        let amount = match field("amount")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| "invalid amount".to_string())?;

        let tx = Self::new(sender, recipient, amount);
        tx.validate()?;
        Ok(tx)
    }

    /// `deserialize_with` adapter that decodes through `from_json`
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reward_transaction() {
        let tx = Transaction::reward("miner", 50.0);
        assert!(tx.is_reward());
        assert_eq!(tx.recipient, "miner");
        assert!(!Transaction::new("A", "B", 1.0).is_reward());
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = Transaction::new("A", "B", 10.0);
        let b = Transaction::new("A", "B", 10.0);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), Transaction::new("A", "B", 11.0).content_hash());
    }

    #[test]
    fn test_validate() {
        assert!(Transaction::new("A", "B", 1.5).validate().is_ok());
        assert!(Transaction::new("", "B", 1.0).validate().is_err());
        assert!(Transaction::new("A", " ", 1.0).validate().is_err());
        assert!(Transaction::new("A", "B", 0.0).validate().is_err());
        assert!(Transaction::new("A", "B", -3.0).validate().is_err());
        assert!(Transaction::new("A", "B", f64::NAN).validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let tx = Transaction::from_json(&json!({"sender": "A", "recipient": "B", "amount": 10}))
            .unwrap();
        assert_eq!(tx, Transaction::new("A", "B", 10.0));

        let tx = Transaction::from_json(&json!({"sender": "A", "recipient": "B", "amount": "2.5"}))
            .unwrap();
        assert_eq!(tx.amount, 2.5);
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(Transaction::from_json(&json!({"sender": "A", "amount": 1})).is_err());
        assert!(
            Transaction::from_json(&json!({"sender": "A", "recipient": "B", "amount": "ten"}))
                .is_err()
        );
        assert!(Transaction::from_json(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_wire_format() {
        let tx = Transaction::new("A", "B", 10.0);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value, json!({"sender": "A", "recipient": "B", "amount": 10.0}));
    }
}
