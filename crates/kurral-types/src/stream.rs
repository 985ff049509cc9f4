use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Cap on stored stream items and stream-map entries.
pub const STREAM_MAP_LIMIT: usize = 100;

/// One recorded output fragment with its position in the full text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub fragment: String,
    pub offset: u64,
    pub length: u64,
    pub index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

/// Restartable streaming view reconstructed from artifact outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStream {
    pub items: Vec<String>,
    pub full_text: String,
    pub stream_map: Vec<StreamEntry>,
}

/// Assemble the streaming portion of an outputs payload from recorded
/// fragments. Items and map entries beyond [`STREAM_MAP_LIMIT`] are dropped
/// and the `truncated` flag is set; `full_text` always covers every fragment.
pub fn build_stream_outputs(fragments: &[(String, u64)]) -> Value {
    let full_text: String = fragments.iter().map(|(text, _)| text.as_str()).collect();
    let total_items = fragments.len();
    let truncated = total_items > STREAM_MAP_LIMIT;

    let mut items = Vec::with_capacity(total_items.min(STREAM_MAP_LIMIT));
    let mut stream_map = Vec::with_capacity(total_items.min(STREAM_MAP_LIMIT));
    let mut offset = 0u64;
    for (index, (fragment, ts_ms)) in fragments.iter().enumerate() {
        let length = fragment.len() as u64;
        if index < STREAM_MAP_LIMIT {
            items.push(fragment.clone());
            stream_map.push(StreamEntry {
                fragment: fragment.clone(),
                offset,
                length,
                index: index as u64,
                timestamp_ms: Some(*ts_ms),
            });
        }
        offset += length;
    }

    json!({
        "full_text": full_text,
        "items": items,
        "total_items": total_items,
        "truncated": truncated,
        "stream_map": stream_map,
    })
}

fn parse_stream_map(outputs: &Value) -> Option<Vec<StreamEntry>> {
    let raw = outputs.get("stream_map")?;
    serde_json::from_value(raw.clone()).ok()
}

fn parse_items(outputs: &Value) -> Option<Vec<String>> {
    let raw = outputs.get("items")?.as_array()?;
    raw.iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Check stream-map integrity against the full text.
///
/// For a complete map: lengths sum to the full-text byte length and offsets
/// are strictly increasing and contiguous from zero. A truncated map is
/// checked as a prefix (contiguity holds, coverage may fall short).
pub fn validate_stream_map(outputs: &Value) -> Result<()> {
    let Some(entries) = parse_stream_map(outputs) else {
        return Ok(());
    };
    let full_text = outputs
        .get("full_text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let truncated = outputs
        .get("truncated")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut expected_offset = 0u64;
    let mut covered = 0u64;
    for (position, entry) in entries.iter().enumerate() {
        if entry.offset != expected_offset {
            return Err(Error::InvariantViolation(format!(
                "stream_map entry {} has offset {} but {} expected",
                position, entry.offset, expected_offset
            )));
        }
        if entry.length != entry.fragment.len() as u64 {
            return Err(Error::InvariantViolation(format!(
                "stream_map entry {} length {} does not match fragment byte length {}",
                position,
                entry.length,
                entry.fragment.len()
            )));
        }
        if entry.length == 0 {
            return Err(Error::InvariantViolation(format!(
                "stream_map entry {} is empty; offsets must be strictly increasing",
                position
            )));
        }
        expected_offset += entry.length;
        covered += entry.length;
    }

    let full_len = full_text.len() as u64;
    if truncated {
        if covered > full_len {
            return Err(Error::InvariantViolation(format!(
                "truncated stream_map covers {} bytes but full_text has {}",
                covered, full_len
            )));
        }
    } else if covered != full_len {
        return Err(Error::InvariantViolation(format!(
            "stream_map covers {} bytes but full_text has {}",
            covered, full_len
        )));
    }
    Ok(())
}

/// Rebuild a restartable stream view from stored outputs.
///
/// An existing stream map is returned intact; bare items synthesize a map
/// with running byte offsets and no timestamps; bare full text becomes a
/// single-fragment map.
pub fn reconstruct_stream(outputs: &Value) -> Option<OutputStream> {
    let mut items = parse_items(outputs);
    let mut full_text = outputs
        .get("full_text")
        .and_then(Value::as_str)
        .map(str::to_string);
    let stream_map = parse_stream_map(outputs);

    if items.is_none() {
        if let Some(text) = &full_text {
            items = Some(vec![text.clone()]);
        }
    }
    if full_text.is_none() {
        if let Some(fragments) = &items {
            full_text = Some(fragments.concat());
        }
    }

    let (items, full_text) = match (items, full_text) {
        (Some(items), Some(full_text)) => (items, full_text),
        _ => return None,
    };

    let stream_map = stream_map.unwrap_or_else(|| {
        let mut offset = 0u64;
        items
            .iter()
            .enumerate()
            .map(|(index, fragment)| {
                let entry = StreamEntry {
                    fragment: fragment.clone(),
                    offset,
                    length: fragment.len() as u64,
                    index: index as u64,
                    timestamp_ms: None,
                };
                offset += fragment.len() as u64;
                entry
            })
            .collect()
    });

    Some(OutputStream {
        items,
        full_text,
        stream_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(parts: &[&str]) -> Vec<(String, u64)> {
        parts
            .iter()
            .enumerate()
            .map(|(i, part)| (part.to_string(), (i as u64 + 1) * 10))
            .collect()
    }

    #[test]
    fn test_build_stream_outputs_offsets() {
        let outputs = build_stream_outputs(&fragments(&["Hel", "lo ", "World"]));
        assert_eq!(outputs["full_text"], "Hello World");
        assert_eq!(outputs["total_items"], 3);
        assert_eq!(outputs["truncated"], false);
        let map = outputs["stream_map"].as_array().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[0]["offset"], 0);
        assert_eq!(map[1]["offset"], 3);
        assert_eq!(map[2]["offset"], 6);
        assert_eq!(map[2]["length"], 5);
        assert_eq!(map[1]["timestamp_ms"], 20);
    }

    #[test]
    fn test_build_stream_outputs_truncates_at_limit() {
        let many: Vec<(String, u64)> = (0..150).map(|i| (format!("f{} ", i), i)).collect();
        let outputs = build_stream_outputs(&many);
        assert_eq!(outputs["truncated"], true);
        assert_eq!(outputs["total_items"], 150);
        assert_eq!(outputs["items"].as_array().unwrap().len(), STREAM_MAP_LIMIT);
        assert_eq!(
            outputs["stream_map"].as_array().unwrap().len(),
            STREAM_MAP_LIMIT
        );
        // Full text still covers everything that streamed.
        let full_text = outputs["full_text"].as_str().unwrap();
        assert!(full_text.ends_with("f149 "));
    }

    #[test]
    fn test_validate_accepts_built_outputs() {
        let outputs = build_stream_outputs(&fragments(&["Hel", "lo ", "World"]));
        assert!(validate_stream_map(&outputs).is_ok());
    }

    #[test]
    fn test_validate_rejects_gap() {
        let mut outputs = build_stream_outputs(&fragments(&["ab", "cd"]));
        outputs["stream_map"][1]["offset"] = serde_json::json!(5);
        assert!(validate_stream_map(&outputs).is_err());
    }

    #[test]
    fn test_validate_rejects_coverage_mismatch() {
        let mut outputs = build_stream_outputs(&fragments(&["ab", "cd"]));
        outputs["full_text"] = serde_json::json!("abcdef");
        assert!(validate_stream_map(&outputs).is_err());
    }

    #[test]
    fn test_reconstruct_passes_existing_map_through() {
        let outputs = build_stream_outputs(&fragments(&["Hel", "lo"]));
        let stream = reconstruct_stream(&outputs).unwrap();
        assert_eq!(stream.full_text, "Hello");
        assert_eq!(stream.stream_map.len(), 2);
        assert_eq!(stream.stream_map[0].timestamp_ms, Some(10));
    }

    #[test]
    fn test_reconstruct_synthesizes_from_items() {
        let outputs = serde_json::json!({"items": ["Hel", "lo ", "World"]});
        let stream = reconstruct_stream(&outputs).unwrap();
        assert_eq!(stream.full_text, "Hello World");
        assert_eq!(stream.stream_map[2].offset, 6);
        assert_eq!(stream.stream_map[2].timestamp_ms, None);
    }

    #[test]
    fn test_reconstruct_single_fragment_from_full_text() {
        let outputs = serde_json::json!({"full_text": "hi"});
        let stream = reconstruct_stream(&outputs).unwrap();
        assert_eq!(stream.items, vec!["hi"]);
        assert_eq!(stream.stream_map.len(), 1);
        assert_eq!(stream.stream_map[0].length, 2);
    }

    #[test]
    fn test_reconstruct_none_without_text() {
        assert!(reconstruct_stream(&serde_json::json!({"result": 5})).is_none());
    }
}
