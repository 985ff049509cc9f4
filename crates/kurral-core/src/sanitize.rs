//! Depth-bounded input sanitization.
//!
//! Captured inputs may arrive as arbitrarily deep JSON. Canonicalization for
//! storage cuts the traversal at a fixed depth, replacing deeper structure
//! with a typed sentinel string. The substitution is stable: the same shape
//! always produces the same sentinel, so cache keys stay deterministic.

use serde_json::{Map, Value};

/// Default traversal depth before structure is elided.
pub const DEFAULT_SANITIZE_DEPTH: usize = 3;

/// Sentinel for an object elided at the depth bound.
const OBJECT_SENTINEL: &str = "<object:max-depth>";

/// Sentinel for an array elided at the depth bound.
const ARRAY_SENTINEL: &str = "<array:max-depth>";

/// Rewrite a value so nothing nests deeper than `max_depth` container levels.
pub fn sanitize_value(value: &Value, max_depth: usize) -> Value {
    sanitize_at(value, max_depth, 0)
}

fn sanitize_at(value: &Value, max_depth: usize, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= max_depth {
                return Value::String(OBJECT_SENTINEL.to_string());
            }
            let mut out = Map::new();
            for (key, val) in map {
                out.insert(key.clone(), sanitize_at(val, max_depth, depth + 1));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            if depth >= max_depth {
                return Value::String(ARRAY_SENTINEL.to_string());
            }
            Value::Array(
                items
                    .iter()
                    .map(|item| sanitize_at(item, max_depth, depth + 1))
                    .collect(),
            )
        }
        leaf => leaf.clone(),
    }
}
