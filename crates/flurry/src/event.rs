//! Outbound events produced for staged files.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// What an emitted event carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// The local path of the staged file.
    #[default]
    Ref,
    /// The file's text, as lines.
    Lines,
    /// The file's raw bytes.
    Binary,
}

/// Start or end of a file's lines when splitting with markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventPayload {
    Path(PathBuf),
    Bytes(#[serde(serialize_with = "serialize_base64")] Vec<u8>),
    Lines(Vec<String>),
    Line(String),
    Marker {
        mark: Mark,
        /// Number of lines emitted, on the end marker only.
        #[serde(skip_serializing_if = "Option::is_none")]
        line_count: Option<u64>,
    },
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMetadata {
    /// Remote key relative to `remote_dir`.
    pub origin_key: String,
    pub remote_dir: String,
    pub local_path: PathBuf,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    /// 1-based line number when lines are split.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
}

/// One message handed to an [`EventSink`](crate::sink::EventSink).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub payload: EventPayload,
    pub metadata: EventMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> EventMetadata {
        EventMetadata {
            origin_key: "a.bin".to_string(),
            remote_dir: "s3://bucket/in".to_string(),
            local_path: PathBuf::from("/spool/a.bin"),
            size: 3,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            line_number: None,
        }
    }

    #[test]
    fn test_binary_payload_is_base64() {
        let event = OutboundEvent {
            payload: EventPayload::Bytes(vec![0, 1, 2]),
            metadata: metadata(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "bytes");
        assert_eq!(json["payload"]["value"], "AAEC");
        assert_eq!(json["metadata"]["origin_key"], "a.bin");
        assert!(json["metadata"].get("line_number").is_none());
    }

    #[test]
    fn test_marker_payload() {
        let event = OutboundEvent {
            payload: EventPayload::Marker {
                mark: Mark::End,
                line_count: Some(2),
            },
            metadata: metadata(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "marker");
        assert_eq!(json["payload"]["value"]["mark"], "end");
        assert_eq!(json["payload"]["value"]["line_count"], 2);
    }

    #[test]
    fn test_read_mode_names() {
        let mode: ReadMode = serde_yaml::from_str("binary").unwrap();
        assert_eq!(mode, ReadMode::Binary);
        assert_eq!(ReadMode::default(), ReadMode::Ref);
    }
}
