//! Pipeline facade tying resolution, caching, comparison, and analysis
//! together.
//!
//! One entry point runs the whole flow for a set of entities: resolve
//! ids, serve cache hits, stream comparisons for the misses, analyze
//! changed pages with bounded fan-out, and write fresh outcomes back to
//! the cache. Cache failures degrade to uncached operation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::archive::ArchiveComparator;
use crate::diff::{DiffOutcome, DiffReport};
use crate::rolling::RollingComparator;
use crate::sources::{ArchiveSource, ChangeAnalyzer, PageSource};
use rivalwatch_core::{AppConfig, DetectionResult, Error, IdentityResolver, StoreDb};

/// Which comparison the pipeline should run.
#[derive(Debug, Clone)]
pub enum CompareMode {
    /// Compare against archive snapshots near `day_delta` days ago.
    Archive { day_delta: i64 },
    /// Compare against the stored baseline under `tag`.
    Rolling { tag: String },
}

/// A competitor page to check.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EntityInput {
    /// Stable id; resolved from the url and name when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    pub url: String,
}

/// One finished pipeline result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineResult {
    pub url: String,
    pub entity_id: String,
    /// JSON payload describing the outcome.
    pub payload: String,
    pub from_cache: bool,
}

pub struct Pipeline {
    store: StoreDb,
    resolver: IdentityResolver,
    pages: Arc<dyn PageSource>,
    background_pages: Arc<dyn PageSource>,
    archives: Arc<dyn ArchiveSource>,
    analyzer: Arc<dyn ChangeAnalyzer>,
    config: AppConfig,
}

impl Pipeline {
    pub fn new(
        store: StoreDb, resolver: IdentityResolver, pages: Arc<dyn PageSource>, background_pages: Arc<dyn PageSource>,
        archives: Arc<dyn ArchiveSource>, analyzer: Arc<dyn ChangeAnalyzer>, config: AppConfig,
    ) -> Self {
        Self { store, resolver, pages, background_pages, archives, analyzer, config }
    }

    /// Run the pipeline for a set of entities, streaming results.
    ///
    /// Cache hits are emitted first, then fresh comparisons in completion
    /// order. Fresh outcomes are cached at the end of the run (first-time
    /// baselines excepted, so the next run can produce a real diff).
    pub async fn run(
        &self, entities: Vec<EntityInput>, enable_caching: bool, mode: CompareMode,
    ) -> Result<mpsc::Receiver<PipelineResult>, Error> {
        if entities.is_empty() {
            return Err(Error::InvalidInput("entity list cannot be empty".into()));
        }

        // Resolve every input to a stable entity id up front.
        let mut entity_of: HashMap<String, String> = HashMap::new();
        let mut urls: Vec<String> = Vec::new();
        for entity in &entities {
            let id = match &entity.id {
                Some(id) => {
                    self.resolver.ensure_exists(id, &entity.display_name, &entity.url).await?;
                    id.clone()
                }
                None => self.resolver.resolve(&entity.url, &entity.display_name).await?,
            };
            if entity_of.insert(entity.url.clone(), id).is_none() {
                urls.push(entity.url.clone());
            }
        }

        let cache_hits = if enable_caching {
            let pairs: Vec<(String, String)> = urls
                .iter()
                .map(|url| (entity_of[url].clone(), url.clone()))
                .collect();
            match self.store.get_cached_results(&pairs).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "cache read failed, running uncached");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let misses: Vec<String> = urls.iter().filter(|url| !cache_hits.contains_key(*url)).cloned().collect();
        info!(total = urls.len(), cached = cache_hits.len(), fresh = misses.len(), "pipeline run starting");

        let reports = self.spawn_comparator(&mode, misses);

        let (tx, rx) = mpsc::channel(16);
        let store = self.store.clone();
        let analyzer = Arc::clone(&self.analyzer);
        let ttl_hours = self.config.cache_ttl_hours;
        let analysis_fanout = self.config.analysis_fanout.max(1);

        tokio::spawn(async move {
            for (url, payload) in cache_hits {
                let entity_id = entity_of.get(&url).cloned().unwrap_or_default();
                let result = PipelineResult { url, entity_id, payload, from_cache: true };
                if tx.send(result).await.is_err() {
                    return;
                }
            }

            let fresh = forward_fresh(reports, &entity_of, analyzer, analysis_fanout, &tx).await;

            if enable_caching && !fresh.is_empty() {
                match store.put_cached_results(&fresh, &entity_of, ttl_hours).await {
                    Ok(written) => debug!(count = written.len(), "cached fresh outcomes"),
                    Err(e) => warn!(error = %e, "cache write failed, results were still delivered"),
                }
            }
        });

        Ok(rx)
    }

    fn spawn_comparator(&self, mode: &CompareMode, urls: Vec<String>) -> mpsc::Receiver<DiffReport> {
        match mode {
            CompareMode::Archive { day_delta } => ArchiveComparator::new(
                Arc::clone(&self.pages),
                Arc::clone(&self.archives),
                self.config.batch_size,
                *day_delta,
            )
            .compare_stream(urls),
            CompareMode::Rolling { tag } => {
                RollingComparator::new(Arc::clone(&self.background_pages), self.store.clone(), tag.clone(), self.config.batch_size)
                    .track_stream(urls)
            }
        }
    }
}

/// Drain comparison reports, analyze changes with bounded fan-out, and
/// forward results as they finish. Returns the outcomes worth caching.
async fn forward_fresh(
    mut reports: mpsc::Receiver<DiffReport>, entity_of: &HashMap<String, String>, analyzer: Arc<dyn ChangeAnalyzer>,
    analysis_fanout: usize, tx: &mpsc::Sender<PipelineResult>,
) -> Vec<DetectionResult> {
    let semaphore = Arc::new(Semaphore::new(analysis_fanout));
    let mut inflight: JoinSet<(DiffReport, String)> = JoinSet::new();
    let mut cacheable = Vec::new();
    let mut reports_done = false;

    loop {
        tokio::select! {
            maybe = reports.recv(), if !reports_done => {
                match maybe {
                    Some(report) => {
                        let analyzer = Arc::clone(&analyzer);
                        let semaphore = Arc::clone(&semaphore);
                        inflight.spawn(async move {
                            let payload = render_payload(&report, &*analyzer, &semaphore).await;
                            (report, payload)
                        });
                    }
                    None => reports_done = true,
                }
            }
            joined = inflight.join_next(), if !inflight.is_empty() => {
                let Some(Ok((report, payload))) = joined else { continue };

                let entity_id = entity_of.get(&report.url).cloned().unwrap_or_default();
                // First-time baselines are not cached so the next run diffs.
                if report.outcome != DiffOutcome::FirstTime {
                    cacheable.push(DetectionResult { url: report.url.clone(), payload: payload.clone() });
                }

                let result = PipelineResult { url: report.url, entity_id, payload, from_cache: false };
                if tx.send(result).await.is_err() {
                    return cacheable;
                }
            }
            else => break,
        }
    }

    cacheable
}

async fn render_payload(report: &DiffReport, analyzer: &dyn ChangeAnalyzer, semaphore: &Semaphore) -> String {
    if let DiffOutcome::Changed { diff } = &report.outcome {
        let analyzed = match semaphore.acquire().await {
            Ok(_permit) => analyzer.analyze(&report.url, diff).await,
            Err(_) => Err(Error::AnalyzeFailed("analysis semaphore closed".into())),
        };
        match analyzed {
            Ok(analysis) => {
                return serde_json::json!({ "kind": "changed", "analysis": analysis }).to_string();
            }
            Err(e) => {
                warn!(url = %report.url, error = %e, "analysis failed, emitting raw diff");
            }
        }
    }

    serde_json::to_string(&report.outcome).unwrap_or_else(|_| "{\"kind\":\"no_changes\"}".to_string())
}
