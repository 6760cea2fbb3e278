use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::DriftwatchError;

/// The external platforms a document can be tracked on.
///
/// Wire names (`platform_a`, `platform_b`) are part of the emitted record
/// schema and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Block-tree document platform: pages made of ordered content blocks,
    /// each with a stable id and a last-edited marker.
    #[serde(rename = "platform_a")]
    PlatformA,

    /// Revisioned document platform: whole-body documents with a linear
    /// revision history.
    #[serde(rename = "platform_b")]
    PlatformB,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::PlatformA => "platform_a",
            Source::PlatformB => "platform_b",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = DriftwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_a" => Ok(Source::PlatformA),
            "platform_b" => Ok(Source::PlatformB),
            other => Err(DriftwatchError::Config(format!(
                "unknown source '{}' (expected platform_a or platform_b)",
                other
            ))),
        }
    }
}

/// The smallest trackable content element of a block-tree document.
///
/// `id` is stable across captures for the same logical element. The
/// revision marker is an opaque provider token; both supported platforms
/// hand out RFC-3339 last-modified timestamps, so lexicographic ordering
/// on markers picks the most recent edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub kind: String,
    pub text: String,
    pub revision_marker: String,
    /// Per-unit editor, when the provider exposes one.
    pub editor: Option<String>,
}

/// Capture of a block-tree document: its units in document order plus the
/// document-level editor fallback for attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub units: Vec<Unit>,
    pub last_edited_by: Option<String>,
}

/// Capture of a revisioned document: the full body at its newest revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub revision_id: String,
    pub text: String,
    pub editor: String,
    pub modified_at: DateTime<Utc>,
}

/// A document's observable state at capture time, in one of the two
/// canonical shapes. Raw platform payloads never leave the provider
/// boundary; everything downstream works on this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Snapshot {
    Units(UnitSnapshot),
    Body(BodySnapshot),
}

impl Snapshot {
    /// Content fingerprint used to short-circuit the no-change case
    /// without running the full diff.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Snapshot::Units(s) => {
                for unit in &s.units {
                    hasher.update(unit.id.as_bytes());
                    hasher.update([0]);
                    hasher.update(unit.revision_marker.as_bytes());
                    hasher.update([0]);
                    hasher.update(unit.text.as_bytes());
                    hasher.update([0]);
                }
            }
            Snapshot::Body(s) => {
                hasher.update(s.revision_id.as_bytes());
                hasher.update([0]);
                hasher.update(s.text.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Persisted per (source, document id): the last-accepted snapshot and
/// when it was taken. Created on first poll, updated after every
/// successful capture, never deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub source: Source,
    pub document_id: String,
    pub last_snapshot: Option<Snapshot>,
    pub last_capture_time: DateTime<Utc>,
}

impl TrackingRecord {
    pub fn new(source: Source, document_id: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            source,
            document_id: document_id.into(),
            last_snapshot: Some(snapshot),
            last_capture_time: Utc::now(),
        }
    }
}

/// Added/deleted text fragments of one capture cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// The emitted change record. Field names and nesting are a wire contract
/// consumed by downstream reporting; do not rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub platform: Source,
    pub document_id: String,
    pub editor: String,
    pub timestamp: DateTime<Utc>,
    pub changes: ChangeSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn unit(id: &str, text: &str, marker: &str) -> Unit {
        Unit {
            id: id.to_string(),
            kind: "paragraph".to_string(),
            text: text.to_string(),
            revision_marker: marker.to_string(),
            editor: None,
        }
    }

    #[test]
    fn test_source_round_trip() {
        assert_eq!("platform_a".parse::<Source>().unwrap(), Source::PlatformA);
        assert_eq!("platform_b".parse::<Source>().unwrap(), Source::PlatformB);
        assert!("platform_c".parse::<Source>().is_err());
        assert_eq!(Source::PlatformA.to_string(), "platform_a");
    }

    #[test]
    fn test_diff_record_wire_format() {
        let record = DiffRecord {
            platform: Source::PlatformA,
            document_id: "doc-1".to_string(),
            editor: "alice".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            changes: ChangeSet {
                added: vec!["World".to_string()],
                deleted: vec![],
            },
        };

        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["platform"], "platform_a");
        assert_eq!(value["document_id"], "doc-1");
        assert_eq!(value["editor"], "alice");
        assert_eq!(value["timestamp"], "2025-03-01T12:00:00Z");
        assert_eq!(value["changes"]["added"][0], "World");
        assert_eq!(value["changes"]["deleted"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_fingerprint_detects_marker_change() {
        let a = Snapshot::Units(UnitSnapshot {
            units: vec![unit("b1", "Hello", "2025-01-01T00:00:00Z")],
            last_edited_by: None,
        });
        let b = Snapshot::Units(UnitSnapshot {
            units: vec![unit("b1", "Hello", "2025-01-02T00:00:00Z")],
            last_edited_by: None,
        });

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        // Text ending where the next id begins must not collide.
        let a = Snapshot::Units(UnitSnapshot {
            units: vec![unit("b1", "xy", "1"), unit("b2", "z", "1")],
            last_edited_by: None,
        });
        let b = Snapshot::Units(UnitSnapshot {
            units: vec![unit("b1", "x", "1"), unit("yb2", "z", "1")],
            last_edited_by: None,
        });
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
