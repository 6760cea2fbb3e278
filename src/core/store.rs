//! Durable storage of [`TrackingRecord`]s.
//!
//! The trait is the contract; any key-value or document store can sit
//! behind it. [`FileStore`] keeps one JSON document per tracked document
//! under a root directory, which is all local operation needs.
//! [`MemoryStore`] backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::{DriftwatchError, Result};

use super::snapshot::{Source, TrackingRecord};

/// Storage backend for tracking records.
///
/// `put` must be idempotent and atomic per document id: a record is
/// either fully written or not written at all. Cross-document atomicity
/// is not required. Store failures are always treated as transient and
/// retried by the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, source: Source, document_id: &str) -> Result<Option<TrackingRecord>>;

    async fn put(&self, record: &TrackingRecord) -> Result<()>;

    /// All tracked (source, document id) pairs, for the poller.
    async fn list(&self) -> Result<Vec<(Source, String)>>;
}

/// File-backed store: `<root>/<source>/<key>.json`, one record per file.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so a crashed write never leaves a partial snapshot behind.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, source: Source, document_id: &str) -> PathBuf {
        self.root
            .join(source.as_str())
            .join(format!("{}.json", sanitize_key(document_id)))
    }
}

/// Document ids come from external platforms and may contain path
/// separators; the real id always lives inside the record itself.
fn sanitize_key(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn get(&self, source: Source, document_id: &str) -> Result<Option<TrackingRecord>> {
        let path = self.record_path(source, document_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record: TrackingRecord = serde_json::from_slice(&bytes)
                    .map_err(|e| DriftwatchError::Store(format!("corrupt record {}: {}", path.display(), e)))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriftwatchError::Store(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(&self, record: &TrackingRecord) -> Result<()> {
        let path = self.record_path(record.source, &record.document_id);
        let dir = path
            .parent()
            .ok_or_else(|| DriftwatchError::Store("record path has no parent".to_string()))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DriftwatchError::Store(format!("create {}: {}", dir.display(), e)))?;

        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| DriftwatchError::Store(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| DriftwatchError::Store(format!("rename into {}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(Source, String)>> {
        let root = self.root.clone();
        // WalkDir is synchronous; the tree is small and this runs off the
        // hot path, once per poll cycle.
        let pairs = tokio::task::spawn_blocking(move || list_records(&root))
            .await
            .map_err(|e| DriftwatchError::Store(format!("list task: {}", e)))??;
        Ok(pairs)
    }
}

fn list_records(root: &Path) -> Result<Vec<(Source, String)>> {
    let mut pairs = Vec::new();
    if !root.exists() {
        return Ok(pairs);
    }

    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| DriftwatchError::Store(format!("walk store: {}", e)))?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let bytes = std::fs::read(entry.path())
            .map_err(|e| DriftwatchError::Store(format!("read {}: {}", entry.path().display(), e)))?;
        let record: TrackingRecord = serde_json::from_slice(&bytes).map_err(|e| {
            DriftwatchError::Store(format!("corrupt record {}: {}", entry.path().display(), e))
        })?;
        pairs.push((record.source, record.document_id));
    }

    pairs.sort();
    Ok(pairs)
}

/// In-memory store for tests, with a failure-injection counter so
/// store-error paths can be exercised.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(Source, String), TrackingRecord>>,
    fail_puts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `put` fail with a store error.
    pub fn fail_next_puts(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, source: Source, document_id: &str) -> Result<Option<TrackingRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&(source, document_id.to_string())).cloned())
    }

    async fn put(&self, record: &TrackingRecord) -> Result<()> {
        let remaining = self.fail_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(DriftwatchError::Store("injected put failure".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        records.insert(
            (record.source, record.document_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(Source, String)>> {
        let records = self.records.lock().unwrap();
        let mut pairs: Vec<_> = records.keys().cloned().collect();
        pairs.sort();
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::{BodySnapshot, Snapshot};
    use chrono::Utc;

    fn record(source: Source, id: &str) -> TrackingRecord {
        TrackingRecord::new(
            source,
            id,
            Snapshot::Body(BodySnapshot {
                revision_id: "r1".to_string(),
                text: "hello".to_string(),
                editor: "alice".to_string(),
                modified_at: Utc::now(),
            }),
        )
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.get(Source::PlatformB, "doc-1").await.unwrap().is_none());

        let rec = record(Source::PlatformB, "doc-1");
        store.put(&rec).await.unwrap();

        let loaded = store.get(Source::PlatformB, "doc-1").await.unwrap().unwrap();
        assert_eq!(loaded.document_id, "doc-1");
        assert_eq!(loaded.last_snapshot, rec.last_snapshot);
    }

    #[tokio::test]
    async fn test_file_store_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let rec = record(Source::PlatformA, "doc-2");
        store.put(&rec).await.unwrap();
        store.put(&rec).await.unwrap();

        let pairs = store.list().await.unwrap();
        assert_eq!(pairs, vec![(Source::PlatformA, "doc-2".to_string())]);
    }

    #[tokio::test]
    async fn test_file_store_list_spans_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put(&record(Source::PlatformA, "a")).await.unwrap();
        store.put(&record(Source::PlatformB, "b")).await.unwrap();

        let pairs = store.list().await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&(Source::PlatformA, "a".to_string())));
        assert!(pairs.contains(&(Source::PlatformB, "b".to_string())));
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_hostile_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let rec = record(Source::PlatformA, "../../etc/passwd");
        store.put(&rec).await.unwrap();

        // The real id survives inside the record even though the file
        // name is sanitized.
        let loaded = store
            .get(Source::PlatformA, "../../etc/passwd")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.document_id, "../../etc/passwd");
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryStore::new();
        store.fail_next_puts(1);

        let rec = record(Source::PlatformA, "doc");
        assert!(store.put(&rec).await.is_err());
        assert!(store.put(&rec).await.is_ok());
    }
}
