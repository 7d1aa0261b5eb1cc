//! Cryptographic primitives for the identity ledger
//!
//! Block hashes are SHA-256 digests over a canonical JSON rendering of the
//! block fields. The canonical form is produced here directly rather than via
//! `serde_json::to_string`, so it does not depend on whether serde_json's map
//! keeps insertion order or sorts keys.

use crate::error::LedgerError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Render `value` as compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Content hash of a block's fields.
///
/// The preimage is the canonical JSON object
/// `{"data":..,"index":..,"previous_hash":..,"timestamp":..}`; the keys are
/// written in sorted order.
pub fn content_hash(index: u64, previous_hash: &str, timestamp: u64, data: &Value) -> String {
    let mut preimage = String::from("{\"data\":");
    write_canonical(data, &mut preimage);
    let _ = write!(preimage, ",\"index\":{}", index);
    let _ = write!(preimage, ",\"previous_hash\":{}", Value::from(previous_hash));
    let _ = write!(preimage, ",\"timestamp\":{}}}", timestamp);
    sha256_hex(preimage.as_bytes())
}

// Leaves go through serde_json's compact `Display`, so numbers and string
// escapes match `serde_json::to_string`; only object key order is ours.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::from(key.as_str()));
                write_canonical(item, out);
            }
            out.push('}');
        }
        leaf => {
            let _ = write!(out, "{}", leaf);
        }
    }
}

/// secp256k1 key material for callers that need a `publicKey` to register.
/// The ledger itself never inspects keys.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Restores a KeyPair from a hex-encoded secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| LedgerError::CryptoError(format!("Invalid hex secret key: {}", e)))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| LedgerError::CryptoError(format!("Invalid secret key bytes: {}", e)))?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Compressed public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [1, {"z": true, "y": null}], "c": "x"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"x","d":[1,{"y":null,"z":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_like_serde() {
        let value = json!("a\"b\\c\n\t\u{1}é");
        assert_eq!(canonical_json(&value), serde_json::to_string(&value).unwrap());
    }

    #[test]
    fn test_canonical_json_matches_serde_for_sorted_input() {
        let value = json!({"a\"key": [1.5, -2, "line\nbreak"], "b": {"\u{7f}": "\u{1f}"}});
        assert_eq!(canonical_json(&value), serde_json::to_string(&value).unwrap());
    }

    #[test]
    fn test_content_hash_independent_of_key_order() {
        let mut first = serde_json::Map::new();
        first.insert("name".to_string(), json!("Alice"));
        first.insert("externalId".to_string(), json!("ID12345"));
        let mut second = serde_json::Map::new();
        second.insert("externalId".to_string(), json!("ID12345"));
        second.insert("name".to_string(), json!("Alice"));

        let a = content_hash(2, "0", 1_700_000_000_000, &Value::Object(first));
        let b = content_hash(2, "0", 1_700_000_000_000, &Value::Object(second));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_depends_on_every_field() {
        let data = json!({"type": "genesis"});
        let base = content_hash(1, "0", 1000, &data);
        assert_ne!(base, content_hash(2, "0", 1000, &data));
        assert_ne!(base, content_hash(1, "1", 1000, &data));
        assert_ne!(base, content_hash(1, "0", 1001, &data));
        assert_ne!(base, content_hash(1, "0", 1000, &json!({"type": "genesis!"})));
    }

    #[test]
    fn test_keypair_roundtrip_from_hex() {
        let keypair = KeyPair::generate();
        assert_eq!(keypair.public_key_hex().len(), 66);
        let restored = KeyPair::from_secret_hex(&keypair.secret_key_hex()).unwrap();
        assert_eq!(restored.public_key_hex(), keypair.public_key_hex());
    }

    #[test]
    fn test_from_secret_hex_invalid_length() {
        let result = KeyPair::from_secret_hex("abcd");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid secret key bytes"));
    }
}
