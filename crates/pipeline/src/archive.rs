//! Archive comparison orchestrator.
//!
//! Compares each page's current text against the archived snapshot
//! nearest to a past target date. URLs are processed in batches with
//! bounded local concurrency; per-URL failures become unavailability
//! outcomes and never abort the batch.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::diff::{DiffReport, diff_report};
use crate::sources::{ArchiveSource, PageSource};

pub struct ArchiveComparator {
    pages: Arc<dyn PageSource>,
    archives: Arc<dyn ArchiveSource>,
    batch_size: usize,
    day_delta: i64,
}

impl ArchiveComparator {
    pub fn new(pages: Arc<dyn PageSource>, archives: Arc<dyn ArchiveSource>, batch_size: usize, day_delta: i64) -> Self {
        Self { pages, archives, batch_size: batch_size.max(1), day_delta }
    }

    /// Stream comparison reports for the given URLs.
    ///
    /// Reports arrive in completion order within each batch. Dropping the
    /// receiver stops the remaining work.
    pub fn compare_stream(&self, urls: Vec<String>) -> mpsc::Receiver<DiffReport> {
        let (tx, rx) = mpsc::channel(16);
        let pages = Arc::clone(&self.pages);
        let archives = Arc::clone(&self.archives);
        let batch_size = self.batch_size;
        let target = (Utc::now() - chrono::Duration::days(self.day_delta)).date_naive();

        tokio::spawn(async move {
            for batch in urls.chunks(batch_size) {
                let semaphore = Arc::new(Semaphore::new(batch_size));
                let mut join_set = JoinSet::new();

                for url in batch.to_vec() {
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        return;
                    };
                    let pages = Arc::clone(&pages);
                    let archives = Arc::clone(&archives);

                    join_set.spawn(async move {
                        let _permit = permit;
                        compare_one(&*pages, &*archives, &url, target).await
                    });
                }

                while let Some(joined) = join_set.join_next().await {
                    let Ok(report) = joined else { continue };
                    if tx.send(report).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }
}

async fn compare_one(pages: &dyn PageSource, archives: &dyn ArchiveSource, url: &str, target: NaiveDate) -> DiffReport {
    // The live fetch and the snapshot lookup are independent.
    let (current, snapshot) = tokio::join!(pages.fetch_page(url), archives.nearest_snapshot(url, target));

    let current = match current {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(url, error = %e, "current page fetch failed");
            None
        }
    };

    let previous = match snapshot {
        Ok(Some(archive)) => {
            debug!(url, snapshot = %archive.archive_url, days = archive.days_difference, "found archive snapshot");
            match pages.fetch_page(&archive.archive_url).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(url, error = %e, "archived page fetch failed");
                    None
                }
            }
        }
        Ok(None) => {
            debug!(url, "no archive snapshot available");
            None
        }
        Err(e) => {
            warn!(url, error = %e, "archive lookup failed");
            None
        }
    };

    diff_report(url, current.as_deref(), previous.as_deref(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffOutcome, MissingSide};
    use async_trait::async_trait;
    use rivalwatch_client::ArchiveRef;
    use rivalwatch_core::Error;
    use std::collections::HashMap;

    struct MapPages(HashMap<String, String>);

    #[async_trait]
    impl PageSource for MapPages {
        async fn fetch_page(&self, url: &str) -> Result<String, Error> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| Error::HttpError("status 404".to_string()))
        }
    }

    struct MapArchives(HashMap<String, String>);

    #[async_trait]
    impl ArchiveSource for MapArchives {
        async fn nearest_snapshot(&self, url: &str, _target: NaiveDate) -> Result<Option<ArchiveRef>, Error> {
            Ok(self.0.get(url).map(|archive_url| ArchiveRef {
                archive_url: archive_url.clone(),
                timestamp: Utc::now(),
                days_difference: 0,
            }))
        }
    }

    fn pages(entries: &[(&str, &str)]) -> Arc<dyn PageSource> {
        Arc::new(MapPages(
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ))
    }

    fn archives(entries: &[(&str, &str)]) -> Arc<dyn ArchiveSource> {
        Arc::new(MapArchives(
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<DiffReport>) -> HashMap<String, DiffOutcome> {
        let mut outcomes = HashMap::new();
        while let Some(report) = rx.recv().await {
            outcomes.insert(report.url, report.outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_changed_page() {
        let comparator = ArchiveComparator::new(
            pages(&[("https://acme.com", "new text"), ("https://archive/acme", "old text")]),
            archives(&[("https://acme.com", "https://archive/acme")]),
            5,
            20,
        );

        let outcomes = collect(comparator.compare_stream(vec!["https://acme.com".to_string()])).await;
        assert!(matches!(outcomes["https://acme.com"], DiffOutcome::Changed { .. }));
    }

    #[tokio::test]
    async fn test_unchanged_page() {
        let comparator = ArchiveComparator::new(
            pages(&[("https://acme.com", "same"), ("https://archive/acme", "same")]),
            archives(&[("https://acme.com", "https://archive/acme")]),
            5,
            20,
        );

        let outcomes = collect(comparator.compare_stream(vec!["https://acme.com".to_string()])).await;
        assert_eq!(outcomes["https://acme.com"], DiffOutcome::NoChanges);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_unavailable_previous() {
        let comparator = ArchiveComparator::new(pages(&[("https://acme.com", "text")]), archives(&[]), 5, 20);

        let outcomes = collect(comparator.compare_stream(vec!["https://acme.com".to_string()])).await;
        assert_eq!(outcomes["https://acme.com"], DiffOutcome::Unavailable { side: MissingSide::Previous });
    }

    #[tokio::test]
    async fn test_one_bad_url_does_not_abort_batch() {
        let comparator = ArchiveComparator::new(
            pages(&[("https://ok.com", "new"), ("https://archive/ok", "old")]),
            archives(&[("https://ok.com", "https://archive/ok")]),
            5,
            20,
        );

        let outcomes = collect(
            comparator.compare_stream(vec!["https://down.com".to_string(), "https://ok.com".to_string()]),
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes["https://down.com"], DiffOutcome::Unavailable { side: MissingSide::Both });
        assert!(matches!(outcomes["https://ok.com"], DiffOutcome::Changed { .. }));
    }
}
