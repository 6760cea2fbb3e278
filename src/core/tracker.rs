//! Per-document capture cycle: fetch → diff → classify → emit → persist.
//!
//! The tracker owns the read-modify-write of one document's
//! [`TrackingRecord`]; callers must never run two cycles for the same
//! document id concurrently (the poller serializes per source).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::core::retry::RetryPolicy;
use crate::error::Result;

use super::classifier;
use super::diff;
use super::providers::ContentProvider;
use super::sink::DiffSink;
use super::snapshot::{DiffRecord, Snapshot, Source, TrackingRecord};
use super::store::SnapshotStore;

/// What one capture cycle produced.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// First-ever capture; the snapshot became the baseline, nothing emitted.
    Baseline,
    /// Content unchanged; `last_capture_time` refreshed, nothing emitted.
    NoChange,
    /// A change record was emitted and the new snapshot persisted.
    Changed(DiffRecord),
}

#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn SnapshotStore>,
    sink: Arc<dyn DiffSink>,
    store_retry: RetryPolicy,
}

impl Tracker {
    pub fn new(store: Arc<dyn SnapshotStore>, sink: Arc<dyn DiffSink>) -> Self {
        Self {
            store,
            sink,
            store_retry: RetryPolicy::default(),
        }
    }

    /// Override the store retry policy (tests, aggressive schedules).
    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    /// Run one capture cycle for a document.
    ///
    /// Failure semantics: any error leaves the stored record exactly as
    /// it was, so the next cycle retries from the same baseline. A
    /// capture counts as complete only once the store write succeeds.
    pub async fn track(
        &self,
        provider: &dyn ContentProvider,
        document_id: &str,
    ) -> Result<CheckOutcome> {
        let source = provider.source();

        let prior = self
            .store_retry
            .run("store.get", || self.store.get(source, document_id))
            .await?;

        let snapshot = provider.fetch(document_id).await?;
        let captured_at = Utc::now();

        let previous = prior.and_then(|record| record.last_snapshot);
        let previous = match previous {
            Some(previous) => previous,
            None => {
                self.persist(source, document_id, snapshot).await?;
                info!(source = %source, document_id, "baseline capture stored");
                return Ok(CheckOutcome::Baseline);
            }
        };

        // Cheap no-op detection before running the full diff.
        if previous.fingerprint() == snapshot.fingerprint() {
            self.persist(source, document_id, snapshot).await?;
            debug!(source = %source, document_id, "no change");
            return Ok(CheckOutcome::NoChange);
        }

        let outcome = diff::diff_snapshots(&previous, &snapshot)?;
        if outcome.is_empty() {
            // Markers moved without content changing (reorder,
            // formatting-only edits). Still refresh the capture time.
            self.persist(source, document_id, snapshot).await?;
            debug!(source = %source, document_id, "markers changed, content identical");
            return Ok(CheckOutcome::NoChange);
        }

        let attribution = classifier::classify(&snapshot, &outcome, captured_at);
        let record = DiffRecord {
            platform: source,
            document_id: document_id.to_string(),
            editor: attribution.editor,
            timestamp: attribution.timestamp,
            changes: outcome.changes,
        };

        // Emit before persisting: if the write fails the next cycle
        // recomputes from the old baseline and may emit this diff again,
        // which downstream consumption tolerates; the reverse order
        // could silently lose a change.
        self.sink.emit(&record).await?;
        self.persist(source, document_id, snapshot).await?;

        info!(
            source = %source,
            document_id,
            added = record.changes.added.len(),
            deleted = record.changes.deleted.len(),
            editor = %record.editor,
            "change record emitted"
        );
        Ok(CheckOutcome::Changed(record))
    }

    async fn persist(&self, source: Source, document_id: &str, snapshot: Snapshot) -> Result<()> {
        let record = TrackingRecord::new(source, document_id, snapshot);
        self.store_retry
            .run("store.put", || self.store.put(&record))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sink::MemorySink;
    use crate::core::snapshot::{Unit, UnitSnapshot};
    use crate::core::store::MemoryStore;
    use crate::error::DriftwatchError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider that serves a scripted sequence of snapshots. `None`
    /// entries simulate a transient fetch failure.
    struct ScriptedProvider {
        source: Source,
        responses: Mutex<VecDeque<Option<Snapshot>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Option<Snapshot>>) -> Self {
            Self {
                source: Source::PlatformA,
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ContentProvider for ScriptedProvider {
        fn source(&self) -> Source {
            self.source
        }

        async fn fetch(&self, _document_id: &str) -> Result<Snapshot> {
            match self.responses.lock().unwrap().pop_front() {
                Some(Some(snapshot)) => Ok(snapshot),
                Some(None) => Err(DriftwatchError::ProviderTransient(
                    "scripted failure".to_string(),
                )),
                None => panic!("provider called more times than scripted"),
            }
        }
    }

    fn unit(id: &str, text: &str, marker: &str) -> Unit {
        Unit {
            id: id.to_string(),
            kind: "paragraph".to_string(),
            text: text.to_string(),
            revision_marker: marker.to_string(),
            editor: Some("alice".to_string()),
        }
    }

    fn units(list: Vec<Unit>) -> Snapshot {
        Snapshot::Units(UnitSnapshot {
            units: list,
            last_edited_by: None,
        })
    }

    fn tracker(store: Arc<MemoryStore>, sink: Arc<MemorySink>) -> Tracker {
        Tracker::new(store, sink)
            .with_store_retry(RetryPolicy::new(2, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_baseline_capture_emits_nothing() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink.clone());
        let provider = ScriptedProvider::new(vec![
            Some(units(vec![unit("b1", "Hello", "1")])),
            Some(units(vec![unit("b1", "Hello", "1")])),
        ]);

        let outcome = tracker.track(&provider, "doc").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Baseline));
        assert!(sink.records().is_empty());

        // Identical second capture: still nothing emitted.
        let outcome = tracker.track(&provider, "doc").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::NoChange));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_added_unit_emits_record() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink.clone());
        let provider = ScriptedProvider::new(vec![
            Some(units(vec![unit("b1", "Hello", "1")])),
            Some(units(vec![
                unit("b1", "Hello", "1"),
                unit("b2", "World", "2"),
            ])),
        ]);

        tracker.track(&provider, "doc").await.unwrap();
        let outcome = tracker.track(&provider, "doc").await.unwrap();

        let CheckOutcome::Changed(record) = outcome else {
            panic!("expected a change record");
        };
        assert_eq!(record.changes.added, vec!["World"]);
        assert!(record.changes.deleted.is_empty());
        assert_eq!(record.editor, "alice");
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_no_change_advances_capture_time() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink.clone());
        let snapshot = units(vec![unit("b1", "same", "1")]);
        let provider =
            ScriptedProvider::new(vec![Some(snapshot.clone()), Some(snapshot.clone())]);

        tracker.track(&provider, "doc").await.unwrap();
        let first = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap()
            .last_capture_time;

        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.track(&provider, "doc").await.unwrap();
        let second = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap()
            .last_capture_time;

        assert!(second > first);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_record_untouched() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink.clone());
        let provider = ScriptedProvider::new(vec![
            Some(units(vec![unit("b1", "Hello", "1")])),
            None,
        ]);

        tracker.track(&provider, "doc").await.unwrap();
        let before = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap();

        let result = tracker.track(&provider, "doc").await;
        assert!(result.is_err());

        let after = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.last_capture_time, before.last_capture_time);
        assert_eq!(after.last_snapshot, before.last_snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_does_not_advance_baseline() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink.clone());
        let provider = ScriptedProvider::new(vec![
            Some(units(vec![unit("b1", "Hello", "1")])),
            Some(units(vec![
                unit("b1", "Hello", "1"),
                unit("b2", "World", "2"),
            ])),
        ]);

        tracker.track(&provider, "doc").await.unwrap();
        let before = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap();

        // Exhaust the 2-attempt store retry budget.
        store.fail_next_puts(2);
        let result = tracker.track(&provider, "doc").await;
        assert!(result.is_err());

        // The diff was emitted, but the baseline must not advance; the
        // next cycle recomputes and may re-emit.
        assert_eq!(sink.records().len(), 1);
        let after = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.last_snapshot, before.last_snapshot);
        assert_eq!(after.last_capture_time, before.last_capture_time);
    }

    #[tokio::test]
    async fn test_shape_mismatch_aborts_without_persisting() {
        use crate::core::snapshot::BodySnapshot;

        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink.clone());
        let provider = ScriptedProvider::new(vec![
            Some(units(vec![unit("b1", "Hello", "1")])),
            Some(Snapshot::Body(BodySnapshot {
                revision_id: "r1".to_string(),
                text: "suddenly a body".to_string(),
                editor: "bob".to_string(),
                modified_at: Utc::now(),
            })),
        ]);

        tracker.track(&provider, "doc").await.unwrap();
        let before = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap();

        let result = tracker.track(&provider, "doc").await;
        assert!(matches!(result, Err(DriftwatchError::Diff(_))));
        assert!(sink.records().is_empty());

        let after = store
            .get(Source::PlatformA, "doc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.last_snapshot, before.last_snapshot);
    }
}
