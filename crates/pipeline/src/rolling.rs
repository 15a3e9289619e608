//! Rolling comparison orchestrator.
//!
//! Compares each page's current text against the latest snapshot stored
//! under a tag, then saves the new text as the next baseline. The first
//! run for a URL establishes its baseline and reports first-time
//! tracking instead of a diff.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::warn;

use crate::diff::{DiffReport, diff_report};
use crate::sources::PageSource;
use rivalwatch_core::StoreDb;

pub struct RollingComparator {
    pages: Arc<dyn PageSource>,
    store: StoreDb,
    tag: String,
    batch_size: usize,
}

impl RollingComparator {
    pub fn new(pages: Arc<dyn PageSource>, store: StoreDb, tag: impl Into<String>, batch_size: usize) -> Self {
        Self { pages, store, tag: tag.into(), batch_size: batch_size.max(1) }
    }

    /// Stream comparison reports for the given URLs.
    ///
    /// Baselines for a batch are loaded before any of its fetches start,
    /// and new content is saved only after the whole batch has been
    /// diffed, so a report never compares against content saved moments
    /// earlier in the same run.
    pub fn track_stream(&self, urls: Vec<String>) -> mpsc::Receiver<DiffReport> {
        let (tx, rx) = mpsc::channel(16);
        let pages = Arc::clone(&self.pages);
        let store = self.store.clone();
        let tag = self.tag.clone();
        let batch_size = self.batch_size;

        tokio::spawn(async move {
            for batch in urls.chunks(batch_size) {
                let previous = match store.latest_content(batch, &tag).await {
                    Ok(map) => map,
                    Err(e) => {
                        warn!(error = %e, "failed to load stored baselines, treating batch as untracked");
                        HashMap::new()
                    }
                };

                let semaphore = Arc::new(Semaphore::new(batch_size));
                let mut join_set = JoinSet::new();

                for url in batch.to_vec() {
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        return;
                    };
                    let pages = Arc::clone(&pages);

                    join_set.spawn(async move {
                        let _permit = permit;
                        let current = match pages.fetch_page(&url).await {
                            Ok(text) => Some(text),
                            Err(e) => {
                                warn!(url, error = %e, "page fetch failed");
                                None
                            }
                        };
                        (url, current)
                    });
                }

                let mut fetched: HashMap<String, String> = HashMap::new();
                while let Some(joined) = join_set.join_next().await {
                    let Ok((url, current)) = joined else { continue };

                    let report = diff_report(&url, current.as_deref(), previous.get(&url).map(String::as_str), false);
                    if let Some(text) = current {
                        fetched.insert(url, text);
                    }
                    if tx.send(report).await.is_err() {
                        return;
                    }
                }

                if let Err(e) = store.save_content(&fetched, &tag).await {
                    warn!(error = %e, "failed to save new baselines");
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffOutcome, MissingSide};
    use async_trait::async_trait;
    use rivalwatch_core::Error;
    use std::sync::Mutex;

    struct MutablePages(Mutex<HashMap<String, String>>);

    impl MutablePages {
        fn new(entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            )))
        }

        fn set(&self, url: &str, text: &str) {
            self.0.lock().unwrap().insert(url.to_string(), text.to_string());
        }
    }

    #[async_trait]
    impl PageSource for MutablePages {
        async fn fetch_page(&self, url: &str) -> Result<String, Error> {
            self.0
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| Error::HttpError("status 404".to_string()))
        }
    }

    async fn collect(mut rx: mpsc::Receiver<DiffReport>) -> HashMap<String, DiffOutcome> {
        let mut outcomes = HashMap::new();
        while let Some(report) = rx.recv().await {
            outcomes.insert(report.url, report.outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_first_run_establishes_baseline() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let pages = MutablePages::new(&[("https://acme.com", "v1")]);
        let comparator = RollingComparator::new(pages, db.clone(), "default", 5);

        let outcomes = collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;
        assert_eq!(outcomes["https://acme.com"], DiffOutcome::FirstTime);

        let saved = db
            .latest_content(&["https://acme.com".to_string()], "default")
            .await
            .unwrap();
        assert_eq!(saved.get("https://acme.com").map(String::as_str), Some("v1"));
    }

    #[tokio::test]
    async fn test_second_run_diffs_against_baseline() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let pages = MutablePages::new(&[("https://acme.com", "v1")]);
        let comparator = RollingComparator::new(pages.clone(), db.clone(), "default", 5);

        collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;

        pages.set("https://acme.com", "v2");
        let outcomes = collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;
        match &outcomes["https://acme.com"] {
            DiffOutcome::Changed { diff } => {
                assert!(diff.contains("-v1"));
                assert!(diff.contains("+v2"));
            }
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unchanged_page_reports_no_changes() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let pages = MutablePages::new(&[("https://acme.com", "v1")]);
        let comparator = RollingComparator::new(pages, db.clone(), "default", 5);

        collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;
        let outcomes = collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;
        assert_eq!(outcomes["https://acme.com"], DiffOutcome::NoChanges);

        // Unchanged content must not grow the history.
        let history = db.content_history("https://acme.com", "default", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_baseline() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let pages = MutablePages::new(&[("https://acme.com", "v1")]);
        let comparator = RollingComparator::new(pages.clone(), db.clone(), "default", 5);

        collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;

        pages.0.lock().unwrap().remove("https://acme.com");
        let outcomes = collect(comparator.track_stream(vec!["https://acme.com".to_string()])).await;
        assert_eq!(outcomes["https://acme.com"], DiffOutcome::Unavailable { side: MissingSide::Current });

        let saved = db
            .latest_content(&["https://acme.com".to_string()], "default")
            .await
            .unwrap();
        assert_eq!(saved.get("https://acme.com").map(String::as_str), Some("v1"));
    }
}
