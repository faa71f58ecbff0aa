// Key management: node identity, signing and verification

use crate::core::hash160;
use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// secp256k1 key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = OsRng;

        let secret_key = SecretKey::new(&mut rng);
        let public_key = secret_key.public_key(&secp);

        Self {
            secret_key,
            public_key,
        }
    }

    /// Create from secret key bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, String> {
        let secp = Secp256k1::new();
        let secret_key =
            SecretKey::from_slice(bytes).map_err(|e| format!("Invalid secret key: {}", e))?;
        let public_key = secret_key.public_key(&secp);

        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Compressed public key bytes
    pub fn pubkey_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    /// Hex of RIPEMD160(SHA256(pubkey))
    pub fn address(&self) -> String {
        hex::encode(hash160(&self.pubkey_bytes()))
    }

    /// DER-encoded ECDSA signature over SHA256(data)
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let secp = Secp256k1::signing_only();
        let signature = secp.sign_ecdsa(&digest_message(data), &self.secret_key);
        signature.serialize_der().to_vec()
    }

    /// Check a DER signature over `data` against compressed or uncompressed
    /// public key bytes. Malformed keys or signatures verify as false.
    pub fn verify(data: &[u8], signature: &[u8], pubkey: &[u8]) -> bool {
        let Ok(public_key) = PublicKey::from_slice(pubkey) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(signature) else {
            return false;
        };

        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&digest_message(data), &signature, &public_key)
            .is_ok()
    }
}

fn digest_message(data: &[u8]) -> Message {
    let digest: [u8; 32] = Sha256::digest(data).into();
    Message::from_digest(digest)
}

/// On-disk form of a wallet
#[derive(Serialize, Deserialize)]
struct StoredWallet {
    secret_key: String,
    address: String,
}

/// Node wallet: one key pair acting as the node's identity
#[derive(Clone)]
pub struct Wallet {
    keypair: KeyPair,
}

impl Wallet {
    /// Create a wallet with a fresh key
    pub fn new() -> Self {
        Self {
            keypair: KeyPair::generate(),
        }
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Address used as the default miner and query address
    pub fn derive_address(&self) -> String {
        self.keypair.address()
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.keypair.sign(data)
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        KeyPair::verify(data, signature, &self.keypair.pubkey_bytes())
    }

    /// Save wallet to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let stored = StoredWallet {
            secret_key: hex::encode(self.keypair.secret_key.secret_bytes()),
            address: self.derive_address(),
        };

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| format!("Failed to serialize wallet: {}", e))?;

        fs::write(path, json).map_err(|e| format!("Failed to write wallet file: {}", e))
    }

    /// Load wallet from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read wallet file: {}", e))?;

        let stored: StoredWallet = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to deserialize wallet: {}", e))?;

        let bytes = hex::decode(&stored.secret_key)
            .map_err(|e| format!("Invalid secret key encoding: {}", e))?;
        let keypair = KeyPair::from_secret_bytes(&bytes)?;

        if keypair.address() != stored.address {
            return Err("Wallet address does not match its key".to_string());
        }

        Ok(Self { keypair })
    }

    /// Load the wallet at `path`, creating and saving a new one if missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Loading wallet from {}", path.display());
            return Self::load(path);
        }

        log::info!("Creating new wallet at {}", path.display());
        let wallet = Self::new();
        wallet.save(path)?;
        Ok(wallet)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp = KeyPair::generate();

        assert_eq!(kp.pubkey_bytes().len(), 33); // Compressed pubkey
        assert_eq!(kp.address().len(), 40);
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let signature = kp.sign(b"block 1");

        assert!(KeyPair::verify(b"block 1", &signature, &kp.pubkey_bytes()));
        assert!(!KeyPair::verify(b"block 2", &signature, &kp.pubkey_bytes()));

        let other = KeyPair::generate();
        assert!(!KeyPair::verify(b"block 1", &signature, &other.pubkey_bytes()));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let kp = KeyPair::generate();
        assert!(!KeyPair::verify(b"data", b"not a signature", &kp.pubkey_bytes()));
        assert!(!KeyPair::verify(b"data", &kp.sign(b"data"), b"not a key"));
    }

    #[test]
    fn test_wallet_address_is_stable() {
        let wallet = Wallet::new();
        assert_eq!(wallet.derive_address(), wallet.derive_address());
        assert_ne!(wallet.derive_address(), Wallet::new().derive_address());

        let signature = wallet.sign(b"hello");
        assert!(wallet.verify(b"hello", &signature));
    }

    #[test]
    fn test_wallet_save_and_load() {
        let path = std::env::temp_dir().join(format!("meshchain-wallet-{}.json", std::process::id()));
        let wallet = Wallet::new();
        wallet.save(&path).unwrap();

        let loaded = Wallet::load(&path).unwrap();
        assert_eq!(loaded.derive_address(), wallet.derive_address());

        let reopened = Wallet::load_or_create(&path).unwrap();
        assert_eq!(reopened.derive_address(), wallet.derive_address());

        fs::remove_file(&path).unwrap();
    }
}
