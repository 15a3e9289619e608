//! Seams between the orchestrators and the network.
//!
//! Orchestrators only see these traits; production wires in the
//! rate-limited HTTP clients and tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

use rivalwatch_client::{ArchiveClient, ArchiveRef, FetchClient};
use rivalwatch_core::{Error, RateLimiter};

/// Produces the current text of a page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, Error>;
}

/// Locates archived snapshots near a target date.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn nearest_snapshot(&self, url: &str, target: NaiveDate) -> Result<Option<ArchiveRef>, Error>;
}

/// Turns a raw diff into a structured analysis payload.
#[async_trait]
pub trait ChangeAnalyzer: Send + Sync {
    async fn analyze(&self, url: &str, diff: &str) -> Result<serde_json::Value, Error>;
}

/// Page source that routes fetches through a rate-limiter provider.
pub struct RateLimitedFetcher {
    client: Arc<FetchClient>,
    limiter: Arc<RateLimiter>,
    provider: String,
}

impl RateLimitedFetcher {
    pub fn new(client: Arc<FetchClient>, limiter: Arc<RateLimiter>, provider: impl Into<String>) -> Self {
        Self { client, limiter, provider: provider.into() }
    }
}

#[async_trait]
impl PageSource for RateLimitedFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, Error> {
        let page = self.limiter.run(&self.provider, self.client.fetch_text(url)).await?;
        Ok(page.text)
    }
}

/// Archive source gated by the archive-lookup provider limits.
pub struct RateLimitedArchive {
    client: Arc<ArchiveClient>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedArchive {
    pub fn new(client: Arc<ArchiveClient>, limiter: Arc<RateLimiter>) -> Self {
        Self { client, limiter }
    }
}

#[async_trait]
impl ArchiveSource for RateLimitedArchive {
    async fn nearest_snapshot(&self, url: &str, target: NaiveDate) -> Result<Option<ArchiveRef>, Error> {
        self.limiter
            .run("archive-lookup", self.client.nearest_snapshot(url, target))
            .await
    }
}

/// Analyzer that summarizes the diff mechanically.
///
/// Stands in where no model-backed analyzer is configured, so the
/// pipeline output shape stays the same either way.
pub struct DiffSummaryAnalyzer;

#[async_trait]
impl ChangeAnalyzer for DiffSummaryAnalyzer {
    async fn analyze(&self, url: &str, diff: &str) -> Result<serde_json::Value, Error> {
        let added = diff.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++")).count();
        let removed = diff.lines().filter(|l| l.starts_with('-') && !l.starts_with("---")).count();

        Ok(json!({
            "url": url,
            "lines_added": added,
            "lines_removed": removed,
            "diff": diff,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_diff_summary_counts() {
        let diff = "--- previous\n+++ current\n@@ -1 +1 @@\n-old price\n+new price\n+new plan\n";
        let value = DiffSummaryAnalyzer.analyze("https://acme.com", diff).await.unwrap();
        assert_eq!(value["lines_added"], 2);
        assert_eq!(value["lines_removed"], 1);
        assert_eq!(value["url"], "https://acme.com");
    }
}
