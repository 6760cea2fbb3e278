use thiserror::Error;

/// Main error type for Driftwatch operations
#[derive(Error, Debug)]
pub enum DriftwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transient provider failure: {0}")]
    ProviderTransient(String),

    #[error("Permanent provider failure: {0}")]
    ProviderPermanent(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Diff computation error: {0}")]
    Diff(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DriftwatchError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// Store errors are always considered transient: a capture is only
    /// complete once the store write lands, so the caller retries rather
    /// than recording a false baseline.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriftwatchError::ProviderTransient(_)
                | DriftwatchError::Store(_)
                | DriftwatchError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DriftwatchError>;
