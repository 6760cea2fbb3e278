mod classifier;
mod diff;
mod engine;
mod poller;
mod providers;
mod rate_limit;
mod retry;
mod sink;
mod snapshot;
mod store;
mod tracker;

pub use classifier::{classify, Attribution, UNKNOWN_EDITOR};
pub use diff::{diff_snapshots, DiffOutcome};
pub use poller::Poller;
pub use providers::{provider_for, BlockProvider, ContentProvider, RevisionProvider};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use sink::{DiffSink, JsonlSink, MemorySink, StdoutSink};
pub use snapshot::{
    BodySnapshot, ChangeSet, DiffRecord, Snapshot, Source, TrackingRecord, Unit, UnitSnapshot,
};
pub use store::{FileStore, MemoryStore, SnapshotStore};
pub use tracker::{CheckOutcome, Tracker};

// Export the main engine
pub use engine::Engine;
