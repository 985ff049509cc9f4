//! Canonical form of streaming outputs is wire-stable: sorted keys, no
//! whitespace, byte offsets.

use kurral_types::{build_stream_outputs, canonical};

#[test]
fn test_stream_outputs_canonical_form() {
    let outputs = build_stream_outputs(&[
        ("Hel".to_string(), 5),
        ("lo ".to_string(), 12),
        ("World".to_string(), 30),
    ]);
    let rendered = canonical::canonical_json(&outputs);
    insta::assert_snapshot!(
        rendered,
        @r#"{"full_text":"Hello World","items":["Hel","lo ","World"],"stream_map":[{"fragment":"Hel","index":0,"length":3,"offset":0,"timestamp_ms":5},{"fragment":"lo ","index":1,"length":3,"offset":3,"timestamp_ms":12},{"fragment":"World","index":2,"length":5,"offset":6,"timestamp_ms":30}],"total_items":3,"truncated":false}"#
    );
}

#[test]
fn test_unicode_fragment_lengths_are_bytes() {
    let outputs = build_stream_outputs(&[("héllo".to_string(), 1), ("→".to_string(), 2)]);
    let map = outputs["stream_map"].as_array().unwrap();
    assert_eq!(map[0]["length"], 6);
    assert_eq!(map[1]["offset"], 6);
    assert_eq!(map[1]["length"], 3);
    assert!(kurral_types::validate_stream_map(&outputs).is_ok());
}
