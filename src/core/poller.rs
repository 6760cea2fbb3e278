//! Fixed-interval driver over the tracked document set.
//!
//! Documents belonging to one source are processed strictly one after
//! another, so the source's rate limit is never contended from two
//! directions; independent sources run as separate tasks. A cycle runs
//! to completion before the next tick is honored (missed ticks are
//! skipped), which also guarantees no two concurrent cycles for the
//! same document id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::providers::ContentProvider;
use super::snapshot::Source;
use super::store::SnapshotStore;
use super::tracker::{CheckOutcome, Tracker};

pub struct Poller {
    store: Arc<dyn SnapshotStore>,
    tracker: Tracker,
    providers: Vec<Arc<dyn ContentProvider>>,
    /// Config-declared documents per source; the store contributes the
    /// rest of the tracked set at cycle time.
    configured: HashMap<Source, Vec<String>>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        tracker: Tracker,
        providers: Vec<Arc<dyn ContentProvider>>,
        configured: HashMap<Source, Vec<String>>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            tracker,
            providers,
            configured,
            interval,
        }
    }

    /// Poll until cancelled. Cancellation is cooperative: the current
    /// document finishes (or fails) cleanly before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            sources = self.providers.len(),
            "poller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }
    }

    /// One pass over every tracked document.
    ///
    /// Failures are isolated per document: a failing fetch or store
    /// write is logged and the cycle moves on.
    pub async fn run_cycle(&self, cancel: &CancellationToken) {
        let tracked = self.tracked_documents().await;

        let mut tasks: JoinSet<()> = JoinSet::new();
        for provider in &self.providers {
            let docs = match tracked.get(&provider.source()) {
                Some(docs) if !docs.is_empty() => docs.clone(),
                _ => continue,
            };
            let provider = provider.clone();
            let tracker = self.tracker.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                for document_id in docs {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match tracker.track(provider.as_ref(), &document_id).await {
                        Ok(CheckOutcome::Changed(record)) => {
                            info!(
                                source = %record.platform,
                                document_id = %record.document_id,
                                "diff recorded"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(
                                source = %provider.source(),
                                document_id = %document_id,
                                error = %e,
                                transient = e.is_transient(),
                                "document check failed, will retry next cycle"
                            );
                        }
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    /// Union of config-declared documents and pairs already in the store,
    /// per source, order preserved and de-duplicated.
    async fn tracked_documents(&self) -> HashMap<Source, Vec<String>> {
        let mut tracked: HashMap<Source, Vec<String>> = self.configured.clone();

        match self.store.list().await {
            Ok(pairs) => {
                for (source, document_id) in pairs {
                    let docs = tracked.entry(source).or_default();
                    if !docs.contains(&document_id) {
                        docs.push(document_id);
                    }
                }
            }
            Err(e) => {
                // Cycle still runs over the configured set.
                warn!(error = %e, "could not list store, polling configured documents only");
            }
        }

        tracked
    }
}
