//! Canonical JSON and content hashing.
//!
//! Canonical form: UTF-8, object keys sorted at every level, no whitespace,
//! shortest-roundtrip numbers, object entries with null values omitted.
//! Every derived hash in the artifact schema (prompt hashes, tool output
//! hashes, cache keys) is SHA-256 over this form.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Byte separating tool name from input in cache-key material.
const CACHE_KEY_SEPARATOR: u8 = 0x1F;

/// Render a value in canonical form.
///
/// `serde_json`'s default map is ordered, so key sorting falls out of
/// rebuilding the tree; null-valued object entries are dropped on the way.
pub fn canonical_json(value: &Value) -> String {
    // Value-to-string serialization cannot fail: keys are always strings
    // and the writer is an in-memory buffer.
    serde_json::to_string(&canonicalize(value)).expect("canonical value serialization")
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                if val.is_null() {
                    continue;
                }
                out.insert(key.clone(), canonicalize(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// SHA-256 over the canonical JSON rendering of a value.
pub fn canonical_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Content-addressed cache key: SHA-256(tool_name || 0x1F || canonical(input)).
///
/// Two tool calls with equal inputs share a key regardless of field insertion
/// order in the source.
pub fn cache_key(tool_name: &str, input: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update([CACHE_KEY_SEPARATOR]);
    hasher.update(canonical_json(input).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Serialize any value into a canonical `Value` tree.
pub fn to_canonical_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(canonicalize(&serde_json::to_value(value)?))
}
