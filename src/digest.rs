//! Content digests for resolved tokens and cache keys.
//!
//! DTIFX addresses all persisted cache state by SHA-256 over canonical JSON.
//! Canonical form is strict key-sorted objects with serde_json's stable
//! number formatting, so two runs over identical inputs always produce
//! byte-equal digests.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize, de};
use sha2::{Digest, Sha256};

/// SHA-256 digest value used for dependency hashes and cache keys.
/// Supports conversion to/from lowercase hex strings and raw byte slices.
/// Serialises as a hex string so digests stay readable in persisted JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenDigest([u8; 32]);

impl Display for TokenDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for TokenDigest {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Parse 64 hex characters into a `TokenDigest`.
impl FromStr for TokenDigest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err("Invalid digest length".to_string());
        }
        let mut h = [0u8; 32];
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        h.copy_from_slice(bytes.as_slice());
        Ok(TokenDigest(h))
    }
}

impl Serialize for TokenDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenDigest::from_str(&s).map_err(de::Error::custom)
    }
}

impl TokenDigest {
    /// Compute the digest of a byte slice.
    pub fn new(data: &[u8]) -> TokenDigest {
        let h = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(h.as_ref());
        TokenDigest(bytes)
    }

    /// Digest several byte sections as one stream, in order.
    pub fn from_sections(sections: &[&[u8]]) -> TokenDigest {
        let mut hasher = Sha256::new();
        for section in sections {
            hasher.update(section);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hasher.finalize().as_ref());
        TokenDigest(bytes)
    }

    /// Digest a JSON value in canonical form.
    pub fn of_value(value: &serde_json::Value) -> TokenDigest {
        TokenDigest::new(canonical_json(value).as_bytes())
    }

    /// Return raw bytes of the digest.
    pub fn to_data(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

/// Render a JSON value in canonical form: object keys sorted ascending,
/// no insignificant whitespace, serde_json number formatting.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json::to_string on a str cannot fail
            out.push_str(&serde_json::to_string(s).unwrap_or_default());
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}
