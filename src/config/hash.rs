//! Desired-body fingerprints.
//!
//! Hashing walks the JSON value with object keys in sorted order, so two
//! bodies with the same content always produce the same digest.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hasher for desired request bodies.
#[derive(Debug, Default)]
pub struct BodyHasher;

impl BodyHasher {
    /// Computes the SHA-256 hex digest of a body.
    #[must_use]
    pub fn hash(body: &Value) -> String {
        let mut hasher = Sha256::new();
        Self::feed(&mut hasher, body);
        hex::encode(hasher.finalize())
    }

    /// Returns the first 8 characters of a hash for display.
    #[must_use]
    pub fn short_hash(hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    fn feed(hasher: &mut Sha256, value: &Value) {
        match value {
            Value::Null => hasher.update(b"n"),
            Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
            Value::Number(n) => {
                hasher.update(b"#");
                hasher.update(n.to_string().as_bytes());
            }
            Value::String(s) => {
                hasher.update(b"s");
                hasher.update((s.len() as u64).to_be_bytes());
                hasher.update(s.as_bytes());
            }
            Value::Array(items) => {
                hasher.update(b"[");
                for item in items {
                    Self::feed(hasher, item);
                }
                hasher.update(b"]");
            }
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                hasher.update(b"{");
                for key in keys {
                    hasher.update((key.len() as u64).to_be_bytes());
                    hasher.update(key.as_bytes());
                    Self::feed(hasher, &map[key]);
                }
                hasher.update(b"}");
            }
        }
    }
}
