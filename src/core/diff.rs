//! Pure snapshot comparison. No I/O happens here; both algorithms work
//! entirely on the canonical [`Snapshot`] shapes.

use std::collections::HashMap;

use crate::error::{DriftwatchError, Result};

use super::snapshot::{BodySnapshot, ChangeSet, Snapshot, Unit, UnitSnapshot};

/// Result of comparing two snapshots of the same document.
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub changes: ChangeSet,
    /// Current-side units that actually contributed content changes
    /// (new units and edited units). Drives editor attribution.
    pub changed_units: Vec<Unit>,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compare two snapshots, dispatching on shape.
///
/// Both snapshots must have the same shape; a mismatch means the stored
/// baseline and the fresh capture disagree about what kind of document
/// this is, which aborts the cycle without persisting anything.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Result<DiffOutcome> {
    match (previous, current) {
        (Snapshot::Units(prev), Snapshot::Units(curr)) => Ok(diff_units(prev, curr)),
        (Snapshot::Body(prev), Snapshot::Body(curr)) => Ok(diff_bodies(prev, curr)),
        _ => Err(DriftwatchError::Diff(
            "snapshot shape mismatch between stored baseline and current capture".to_string(),
        )),
    }
}

/// Set-based unit reconciliation.
///
/// Membership by unit id decides added/deleted (the unit's full text is
/// the fragment). Units present on both sides are re-examined only when
/// their revision marker differs, in which case a line diff of the unit
/// text contributes to both lists. Unit order is ignored: reordering
/// alone is not a change.
fn diff_units(previous: &UnitSnapshot, current: &UnitSnapshot) -> DiffOutcome {
    let prev_by_id: HashMap<&str, &Unit> = previous
        .units
        .iter()
        .map(|u| (u.id.as_str(), u))
        .collect();
    let curr_by_id: HashMap<&str, &Unit> = current
        .units
        .iter()
        .map(|u| (u.id.as_str(), u))
        .collect();

    let mut outcome = DiffOutcome::default();

    for unit in &current.units {
        match prev_by_id.get(unit.id.as_str()) {
            None => {
                // Empty text is a valid value; a new empty unit is still new.
                outcome.changes.added.push(unit.text.clone());
                outcome.changed_units.push(unit.clone());
            }
            Some(prev_unit) if prev_unit.revision_marker != unit.revision_marker => {
                let (added, deleted) = diff_lines(&prev_unit.text, &unit.text);
                if !added.is_empty() || !deleted.is_empty() {
                    outcome.changes.added.extend(added);
                    outcome.changes.deleted.extend(deleted);
                    outcome.changed_units.push(unit.clone());
                }
                // Marker moved but text is identical: a formatting-only
                // edit, which must not surface as a content change.
            }
            Some(_) => {}
        }
    }

    for unit in &previous.units {
        if !curr_by_id.contains_key(unit.id.as_str()) {
            outcome.changes.deleted.push(unit.text.clone());
        }
    }

    outcome
}

/// Whole-body reconciliation: an LCS edit script over the line streams.
fn diff_bodies(previous: &BodySnapshot, current: &BodySnapshot) -> DiffOutcome {
    let (added, deleted) = diff_lines(&previous.text, &current.text);
    DiffOutcome {
        changes: ChangeSet { added, deleted },
        changed_units: Vec::new(),
    }
}

/// Line-level diff via longest common subsequence.
///
/// Returns `(added, deleted)` with each list in document order, so that
/// removing `deleted` from the previous text and inserting `added` (in
/// order) reproduces the current text. Lines are opaque: no markup
/// awareness.
pub fn diff_lines(previous: &str, current: &str) -> (Vec<String>, Vec<String>) {
    let prev: Vec<&str> = previous.lines().collect();
    let curr: Vec<&str> = current.lines().collect();

    // lcs[i][j] = LCS length of prev[i..] and curr[j..]
    let mut lcs = vec![vec![0u32; curr.len() + 1]; prev.len() + 1];
    for i in (0..prev.len()).rev() {
        for j in (0..curr.len()).rev() {
            lcs[i][j] = if prev[i] == curr[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut added = Vec::new();
    let mut deleted = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < prev.len() && j < curr.len() {
        if prev[i] == curr[j] {
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            deleted.push(prev[i].to_string());
            i += 1;
        } else {
            added.push(curr[j].to_string());
            j += 1;
        }
    }
    deleted.extend(prev[i..].iter().map(|l| l.to_string()));
    added.extend(curr[j..].iter().map(|l| l.to_string()));

    (added, deleted)
}
