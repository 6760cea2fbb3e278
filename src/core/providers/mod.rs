//! Platform content providers.
//!
//! A provider turns a document id into a canonical [`Snapshot`], fully
//! resolved: whatever pagination, tree walking, or format unwrapping the
//! platform requires happens here, and raw payload shapes never leave
//! this module.

mod blocks;
mod revisions;

pub use blocks::BlockProvider;
pub use revisions::RevisionProvider;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::{DriftwatchError, Result};

use super::snapshot::{Snapshot, Source};

#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Which platform this provider talks to.
    fn source(&self) -> Source;

    /// Capture the document's current state.
    ///
    /// Must return a complete snapshot or fail; a partially resolved
    /// document is never returned. Rate limiting and bounded retries are
    /// the provider's responsibility, so a returned error is already
    /// past its retry budget.
    async fn fetch(&self, document_id: &str) -> Result<Snapshot>;
}

/// Build the provider for a configured source. Fails when no API token
/// can be resolved.
pub fn provider_for(source: Source, config: &SourceConfig) -> Result<Box<dyn ContentProvider>> {
    let token = config.resolve_token(source)?;
    Ok(match source {
        Source::PlatformA => Box::new(BlockProvider::new(config, token)),
        Source::PlatformB => Box::new(RevisionProvider::new(config, token)),
    })
}

/// Map an HTTP status to the transient/permanent taxonomy.
///
/// Rate limiting and server trouble are worth retrying; auth failures
/// and missing documents are not, and escalation (stop tracking, alert)
/// is an external policy decision.
pub(crate) fn classify_status(status: reqwest::StatusCode, context: &str) -> DriftwatchError {
    if status.as_u16() == 429 || status.is_server_error() {
        DriftwatchError::ProviderTransient(format!("{}: HTTP {}", context, status))
    } else {
        DriftwatchError::ProviderPermanent(format!("{}: HTTP {}", context, status))
    }
}

/// Map a reqwest transport error. Timeouts and connection failures are
/// transient; anything else (e.g. a malformed URL) is permanent.
pub(crate) fn classify_transport(error: reqwest::Error, context: &str) -> DriftwatchError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        DriftwatchError::ProviderTransient(format!("{}: {}", context, error))
    } else {
        DriftwatchError::ProviderPermanent(format!("{}: {}", context, error))
    }
}

/// Decode a JSON response body; a body that isn't JSON at all is a
/// transient platform hiccup (proxies returning HTML error pages).
pub(crate) async fn read_json(
    response: reqwest::Response,
    context: &str,
) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(status, context));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| DriftwatchError::ProviderTransient(format!("{}: bad body: {}", context, e)))
}
