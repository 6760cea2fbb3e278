use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;

use super::poller::Poller;
use super::providers::{self, ContentProvider};
use super::sink::{DiffSink, JsonlSink, StdoutSink};
use super::snapshot::Source;
use super::store::{FileStore, SnapshotStore};
use super::tracker::{CheckOutcome, Tracker};

/// Main orchestration engine: wires config into providers, store, sink,
/// tracker, and poller, and backs each CLI command.
pub struct Engine {
    config: Config,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(Self { config })
    }

    /// Write a default configuration file.
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let path = path.unwrap_or_else(|| PathBuf::from("Driftwatch.toml"));
        if path.exists() {
            anyhow::bail!("{} already exists, not overwriting", path.display());
        }
        Config::default().save(&path)?;
        info!("📝 Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// One-shot check of a single document, printing the change record
    /// (or a status line) to stdout.
    pub async fn check(&self, source: Source, document_id: &str) -> Result<()> {
        let store: Arc<dyn SnapshotStore> = Arc::new(FileStore::new(&self.config.store.path));
        let provider = providers::provider_for(source, self.config.source(source))?;
        let tracker = Tracker::new(store, Arc::new(StdoutSink));

        match tracker.track(provider.as_ref(), document_id).await? {
            CheckOutcome::Baseline => {
                println!("baseline created for {} on {}", document_id, source)
            }
            CheckOutcome::NoChange => println!("no change for {} on {}", document_id, source),
            // StdoutSink already printed the record.
            CheckOutcome::Changed(_) => {}
        }
        Ok(())
    }

    /// Run the poller over all enabled sources until ctrl-c.
    pub async fn watch(&self) -> Result<()> {
        let store: Arc<dyn SnapshotStore> = Arc::new(FileStore::new(&self.config.store.path));
        let sink: Arc<dyn DiffSink> = Arc::new(JsonlSink::new(&self.config.sink.path));

        let mut enabled_providers: Vec<Arc<dyn ContentProvider>> = Vec::new();
        let mut configured: HashMap<Source, Vec<String>> = HashMap::new();
        for source in [Source::PlatformA, Source::PlatformB] {
            let source_config = self.config.source(source);
            if !source_config.enabled {
                debug!(source = %source, "source disabled, skipping");
                continue;
            }
            let provider = providers::provider_for(source, source_config)?;
            enabled_providers.push(Arc::from(provider));
            configured.insert(source, source_config.documents.clone());
        }
        if enabled_providers.is_empty() {
            anyhow::bail!("no sources enabled in configuration");
        }

        let tracker = Tracker::new(store.clone(), sink);
        let poller = Poller::new(
            store,
            tracker,
            enabled_providers,
            configured,
            Duration::from_secs(self.config.poller.interval_secs),
        );

        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, finishing in-flight work");
                signal_cancel.cancel();
            }
        });

        poller.run(cancel).await;
        Ok(())
    }

    /// Print all tracked (source, document id) pairs.
    pub async fn list(&self) -> Result<()> {
        let store = FileStore::new(&self.config.store.path);
        let pairs = store.list().await?;
        if pairs.is_empty() {
            println!("no tracked documents");
            return Ok(());
        }
        for (source, document_id) in pairs {
            println!("{}  {}", source, document_id);
        }
        Ok(())
    }
}
