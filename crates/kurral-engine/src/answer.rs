//! Final-answer selection from an outputs payload.
//!
//! Key preference: `result` → `full_text` → `output` → `answer` → first
//! non-empty string value → the full JSON payload.

use serde_json::Value;

use kurral_types::canonical;

const PREFERRED_KEYS: [&str; 4] = ["result", "full_text", "output", "answer"];

fn usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// The key that holds the run's final answer, if any.
pub fn answer_key(outputs: &Value) -> Option<String> {
    let map = outputs.as_object()?;
    for key in PREFERRED_KEYS {
        if map.get(key).is_some_and(usable) {
            return Some(key.to_string());
        }
    }
    map.iter()
        .find(|(_, value)| matches!(value, Value::String(text) if !text.is_empty()))
        .map(|(key, _)| key.clone())
}

/// Human-facing rendering of the final answer.
pub fn final_answer(outputs: &Value) -> String {
    if let Some(key) = answer_key(outputs) {
        if let Some(value) = outputs.get(&key) {
            return match value {
                Value::String(text) => text.clone(),
                other => canonical::canonical_json(other),
            };
        }
    }
    canonical::canonical_json(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_preferred_over_full_text() {
        let outputs = json!({"full_text": "long transcript", "result": "42"});
        assert_eq!(answer_key(&outputs).as_deref(), Some("result"));
        assert_eq!(final_answer(&outputs), "42");
    }

    #[test]
    fn test_empty_preferred_key_skipped() {
        let outputs = json!({"result": "", "full_text": "hi"});
        assert_eq!(answer_key(&outputs).as_deref(), Some("full_text"));
    }

    #[test]
    fn test_first_non_empty_string_fallback() {
        let outputs = json!({"count": 3, "note": "done"});
        assert_eq!(answer_key(&outputs).as_deref(), Some("note"));
    }

    #[test]
    fn test_full_json_fallback() {
        let outputs = json!({"count": 3});
        assert_eq!(answer_key(&outputs), None);
        assert_eq!(final_answer(&outputs), r#"{"count":3}"#);
    }

    #[test]
    fn test_non_string_answer_rendered_canonically() {
        let outputs = json!({"result": {"objects": ["cat", "dog"]}});
        assert_eq!(final_answer(&outputs), r#"{"objects":["cat","dog"]}"#);
    }
}
