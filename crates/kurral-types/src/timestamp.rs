//! RFC-3339 timestamp serialization with an explicit `Z` suffix.
//!
//! Chrono's default formatting renders UTC offsets as `+00:00`; the artifact
//! format requires `Z`. Use with `#[serde(with = "kurral_types::timestamp")]`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "super")]
        ts: DateTime<Utc>,
    }

    #[test]
    fn test_explicit_z_suffix() {
        let wrapper = Wrapper {
            ts: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert_eq!(json, r#"{"ts":"2026-03-14T09:26:53Z"}"#);
    }

    #[test]
    fn test_roundtrip_preserves_subsecond_precision() {
        let ts = DateTime::parse_from_rfc3339("2026-03-14T09:26:53.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let wrapper = Wrapper { ts };
        let json = serde_json::to_string(&wrapper).unwrap();
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wrapper);
    }

    #[test]
    fn test_accepts_offset_form() {
        let back: Wrapper =
            serde_json::from_str(r#"{"ts":"2026-03-14T09:26:53+00:00"}"#).unwrap();
        assert_eq!(
            back.ts,
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
        );
    }
}
