//! Attribution of a change to a single editor and timestamp.

use chrono::{DateTime, Utc};

use super::diff::DiffOutcome;
use super::snapshot::Snapshot;

/// Editor string used when no identity can be derived. Never fabricated
/// from unrelated metadata.
pub const UNKNOWN_EDITOR: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub editor: String,
    pub timestamp: DateTime<Utc>,
}

/// Derive the editor and timestamp for an emitted record.
///
/// Whole-body snapshots carry revision metadata directly. For unit
/// snapshots the most recently modified changed unit wins (revision
/// markers order lexicographically); a unit without its own editor falls
/// back to the document-level last-edited-by, then to [`UNKNOWN_EDITOR`].
/// A pure deletion leaves no current-side marker, so it is attributed to
/// the document-level editor (if any) at capture time.
pub fn classify(
    current: &Snapshot,
    outcome: &DiffOutcome,
    captured_at: DateTime<Utc>,
) -> Attribution {
    match current {
        Snapshot::Body(body) => Attribution {
            editor: if body.editor.is_empty() {
                UNKNOWN_EDITOR.to_string()
            } else {
                body.editor.clone()
            },
            timestamp: body.modified_at,
        },
        Snapshot::Units(units) => {
            let latest = outcome
                .changed_units
                .iter()
                .max_by(|a, b| a.revision_marker.cmp(&b.revision_marker));

            let document_editor = units.last_edited_by.clone();

            match latest {
                Some(unit) => Attribution {
                    editor: unit
                        .editor
                        .clone()
                        .or(document_editor)
                        .unwrap_or_else(|| UNKNOWN_EDITOR.to_string()),
                    timestamp: DateTime::parse_from_rfc3339(&unit.revision_marker)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or(captured_at),
                },
                None => Attribution {
                    editor: document_editor.unwrap_or_else(|| UNKNOWN_EDITOR.to_string()),
                    timestamp: captured_at,
                },
            }
        }
    }
}
