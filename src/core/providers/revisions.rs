//! Adapter for the revisioned document platform (wire name `platform_b`).
//!
//! The platform keeps a linear revision history per document. A capture
//! pages through the revision list to the newest entry for editor and
//! timestamp metadata, then exports the document body as plain text.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::SourceConfig;
use crate::core::rate_limit::{RateLimitConfig, RateLimiter};
use crate::core::retry::RetryPolicy;
use crate::core::snapshot::{BodySnapshot, Snapshot, Source};
use crate::error::{DriftwatchError, Result};

use super::{classify_transport, read_json, ContentProvider};

pub struct RevisionProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl RevisionProvider {
    pub fn new(config: &SourceConfig, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            limiter: RateLimiter::new(RateLimitConfig {
                requests_per_minute: config.requests_per_minute,
                burst_size: config.burst_size,
            }),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        }
    }

    async fn fetch_revisions_page(&self, document_id: &str, token: Option<&str>) -> Result<Value> {
        let url = format!("{}/files/{}/revisions", self.base_url, document_id);
        let context = format!("revisions of {}", document_id);

        self.retry
            .run(&context, || {
                let url = url.clone();
                let context = context.clone();
                let page_token = token.map(|t| t.to_string());
                async move {
                    self.limiter.acquire().await;

                    let mut request = self.client.get(&url).bearer_auth(&self.token);
                    if let Some(page_token) = &page_token {
                        request = request.query(&[("pageToken", page_token.as_str())]);
                    }

                    let response = request
                        .send()
                        .await
                        .map_err(|e| classify_transport(e, &context))?;
                    read_json(response, &context).await
                }
            })
            .await
    }

    async fn export_text(&self, document_id: &str) -> Result<String> {
        let url = format!("{}/files/{}/export", self.base_url, document_id);
        let context = format!("export of {}", document_id);

        self.retry
            .run(&context, || {
                let url = url.clone();
                let context = context.clone();
                async move {
                    self.limiter.acquire().await;

                    let response = self
                        .client
                        .get(&url)
                        .bearer_auth(&self.token)
                        .query(&[("mimeType", "text/plain")])
                        .send()
                        .await
                        .map_err(|e| classify_transport(e, &context))?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(super::classify_status(status, &context));
                    }
                    response
                        .text()
                        .await
                        .map_err(|e| classify_transport(e, &context))
                }
            })
            .await
    }
}

#[async_trait]
impl ContentProvider for RevisionProvider {
    fn source(&self) -> Source {
        Source::PlatformB
    }

    async fn fetch(&self, document_id: &str) -> Result<Snapshot> {
        // Walk the revision list to its end; only the newest revision
        // matters for attribution.
        let mut newest: Option<Value> = None;
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .fetch_revisions_page(document_id, page_token.as_deref())
                .await?;

            if let Some(revisions) = page["revisions"].as_array() {
                if let Some(last) = revisions.last() {
                    newest = Some(last.clone());
                }
            }

            match page["nextPageToken"].as_str() {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }

        let newest = newest.ok_or_else(|| {
            DriftwatchError::ProviderPermanent(format!(
                "document {} has no revisions",
                document_id
            ))
        })?;
        let revision = parse_revision(&newest, document_id);

        let text = self.export_text(document_id).await?;

        Ok(Snapshot::Body(BodySnapshot {
            revision_id: revision.id,
            text,
            editor: revision.editor,
            modified_at: revision.modified_at,
        }))
    }
}

struct RevisionMeta {
    id: String,
    editor: String,
    modified_at: DateTime<Utc>,
}

fn parse_revision(revision: &Value, document_id: &str) -> RevisionMeta {
    let id = revision["id"].as_str().unwrap_or("unknown").to_string();

    let editor = revision["lastModifyingUser"]["displayName"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let modified_at = revision["modifiedTime"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| {
            warn!(
                source = %Source::PlatformB,
                document_id,
                "revision has no parseable modifiedTime, using capture time"
            );
            Utc::now()
        });

    RevisionMeta {
        id,
        editor,
        modified_at,
    }
}
