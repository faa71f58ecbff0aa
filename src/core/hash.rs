// Hashing utilities: canonical JSON + SHA-256

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Canonical serialization used for every content hash.
///
/// The value is first lowered to a `serde_json::Value`, whose object maps are
/// ordered by key, so the output is compact JSON with sorted keys regardless of
/// struct field order.
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    let value = serde_json::to_value(value).expect("in-memory values always lower to JSON");
    value.to_string()
}

/// Single SHA256 hash, hex encoded
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA256 of the canonical serialization of `value`
pub fn content_hash<T: Serialize>(value: &T) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// RIPEMD160(SHA256(data)) - used for address derivation
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::{Digest as RipemdDigest, Ripemd160};
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

/// Number of leading `'0'` hex characters in a digest
pub fn leading_zeros(hash: &str) -> usize {
    hash.bytes().take_while(|b| *b == b'0').count()
}
