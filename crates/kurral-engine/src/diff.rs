//! Output comparison: hashing, structural matching, and the three-way diff.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value pair for a key present on both sides with different values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedEntry {
    pub original: Value,
    pub replayed: Value,
}

/// Three-way partition of diverging outputs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputDiff {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub added: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub removed: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modified: BTreeMap<String, ModifiedEntry>,
}

impl OutputDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Top-level key diff between original and replayed outputs. Non-object
/// payloads are compared under a synthetic `value` key.
pub fn compute_diff(original: &Value, replayed: &Value) -> OutputDiff {
    let mut diff = OutputDiff::default();

    let (Some(original_map), Some(replayed_map)) = (original.as_object(), replayed.as_object())
    else {
        if original != replayed {
            diff.modified.insert(
                "value".to_string(),
                ModifiedEntry {
                    original: original.clone(),
                    replayed: replayed.clone(),
                },
            );
        }
        return diff;
    };

    for (key, replayed_value) in replayed_map {
        match original_map.get(key) {
            None => {
                diff.added.insert(key.clone(), replayed_value.clone());
            }
            Some(original_value) if original_value != replayed_value => {
                diff.modified.insert(
                    key.clone(),
                    ModifiedEntry {
                        original: original_value.clone(),
                        replayed: replayed_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, original_value) in original_map {
        if !replayed_map.contains_key(key) {
            diff.removed.insert(key.clone(), original_value.clone());
        }
    }

    diff
}

/// Structural equivalence: objects match on key sets and value types, lists
/// on length and element types, null only on null.
pub fn structural_match(original: &Value, replayed: &Value) -> bool {
    match (original, replayed) {
        (Value::Object(a), Value::Object(b)) => {
            if a.len() != b.len() {
                return false;
            }
            a.iter().all(|(key, value)| {
                b.get(key)
                    .is_some_and(|other| structural_match(value, other))
            })
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| structural_match(x, y))
        }
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Number(_), Value::Number(_)) => true,
        (Value::String(_), Value::String(_)) => true,
        _ => false,
    }
}
