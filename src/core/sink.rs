//! Outward edge for emitted records.
//!
//! The real consumer (reporting/API layer) lives outside this subsystem;
//! these sinks cover the CLI one-shot, a durable local JSONL stream for
//! the poller, and test capture.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{DriftwatchError, Result};

use super::snapshot::DiffRecord;

#[async_trait]
pub trait DiffSink: Send + Sync {
    async fn emit(&self, record: &DiffRecord) -> Result<()>;
}

/// Prints the wire-format JSON to standard output. Used by `driftwatch check`.
pub struct StdoutSink;

#[async_trait]
impl DiffSink for StdoutSink {
    async fn emit(&self, record: &DiffRecord) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(record)?);
        Ok(())
    }
}

/// Appends one wire-format JSON line per record to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiffSink for JsonlSink {
    async fn emit(&self, record: &DiffRecord) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DriftwatchError::Sink(format!("open {}: {}", self.path.display(), e)))?;
        file.write_all(&line)
            .await
            .map_err(|e| DriftwatchError::Sink(format!("append {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

/// Collects records in memory for assertions.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<DiffRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiffRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiffSink for MemorySink {
    async fn emit(&self, record: &DiffRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
