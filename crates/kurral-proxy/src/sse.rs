//! Incremental Server-Sent-Event parsing.
//!
//! Upstream bodies arrive as arbitrary byte chunks; events are complete only
//! at a blank-line boundary. The parser buffers across chunks and yields
//! fully delimited events.

use serde_json::Value;

/// One wire-level event before timestamping
#[derive(Debug, Clone, PartialEq)]
pub struct RawSseEvent {
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<RawSseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(event) = parse_block(block.trim_end()) {
                events.push(event);
            }
        }
        events
    }

    /// Whether a partial event is still buffered.
    pub fn has_partial(&self) -> bool {
        !self.buffer.trim().is_empty()
    }
}

fn parse_block(block: &str) -> Option<RawSseEvent> {
    let mut event = "message".to_string();
    let mut data_lines: Vec<&str> = Vec::new();
    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    let raw_data = data_lines.join("\n");
    let data = serde_json::from_str(&raw_data).unwrap_or(Value::String(raw_data));
    Some(RawSseEvent { event, data })
}

/// Render one event in wire format.
pub fn format_event(event: &str, data: &Value) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        event,
        serde_json::to_string(data).unwrap_or_else(|_| "null".to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: start\ndata: {\"status\":\"started\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "start");
        assert_eq!(events[0].data, json!({"status": "started"}));
        assert!(!parser.has_partial());
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: prog").is_empty());
        assert!(parser.feed("ress\ndata: {\"percent\":").is_empty());
        assert!(parser.has_partial());
        let events = parser.feed(" 25}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "progress");
        assert_eq!(events[0].data, json!({"percent": 25}));
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let chunk = "event: progress\ndata: {\"percent\": 50}\n\nevent: complete\ndata: {\"result\": {\"ok\": true}}\n\n";
        let events = parser.feed(chunk);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, "complete");
        assert_eq!(events[1].data["result"]["ok"], json!(true));
    }

    #[test]
    fn test_default_event_name_and_plain_data() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: not json\n\n");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, json!("not json"));
    }

    #[test]
    fn test_format_roundtrips_through_parser() {
        let wire = format_event("complete", &json!({"result": {"objects": ["cat"]}}));
        let mut parser = SseParser::new();
        let events = parser.feed(&wire);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "complete");
        assert_eq!(events[0].data, json!({"result": {"objects": ["cat"]}}));
    }
}
