//! rivalwatch entry point.
//!
//! Reads a TOML entity list, runs the requested comparison mode, and
//! prints one JSON result per line on stdout. Logging goes to stderr so
//! stdout stays machine-readable.

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rivalwatch_client::{ArchiveClient, FetchClient, FetchConfig};
use rivalwatch_core::{AppConfig, IdentityResolver, RateLimiter, StoreDb, spawn_sweeper};
use rivalwatch_pipeline::{
    CompareMode, DiffSummaryAnalyzer, EntityInput, Pipeline, RateLimitedArchive, RateLimitedFetcher,
};

#[derive(serde::Deserialize)]
struct EntityFile {
    entities: Vec<EntityInput>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(entities_path) = args.next() else {
        bail!("usage: rivalwatch <entities.toml> [archive|rolling]");
    };
    let mode_arg = args.next().unwrap_or_else(|| "archive".to_string());

    let config = AppConfig::load().context("failed to load configuration")?;

    let mode = match mode_arg.as_str() {
        "archive" => CompareMode::Archive { day_delta: config.archive_day_delta },
        "rolling" => CompareMode::Rolling { tag: config.rolling_tag.clone() },
        other => bail!("unknown mode {other:?}, expected archive or rolling"),
    };

    let raw = std::fs::read_to_string(&entities_path)
        .with_context(|| format!("failed to read {entities_path}"))?;
    let entity_file: EntityFile = toml::from_str(&raw).with_context(|| format!("failed to parse {entities_path}"))?;

    let store = StoreDb::open(&config.db_path).await.context("failed to open store")?;
    let sweeper = spawn_sweeper(store.clone(), config.sweep_interval());

    let limiter = Arc::new(RateLimiter::new(config.limits.as_table()));
    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        max_bytes: config.max_bytes,
        timeout: config.timeout(),
        ..FetchConfig::default()
    };
    let fetch_client = Arc::new(FetchClient::new(fetch_config).context("failed to build fetch client")?);
    let archive_client =
        Arc::new(ArchiveClient::new(&config.user_agent, config.timeout()).context("failed to build archive client")?);

    let pipeline = Pipeline::new(
        store.clone(),
        IdentityResolver::new(store),
        Arc::new(RateLimitedFetcher::new(Arc::clone(&fetch_client), Arc::clone(&limiter), "scrape")),
        Arc::new(RateLimitedFetcher::new(fetch_client, Arc::clone(&limiter), "scrape-background")),
        Arc::new(RateLimitedArchive::new(archive_client, limiter)),
        Arc::new(DiffSummaryAnalyzer),
        config,
    );

    let mut results = pipeline.run(entity_file.entities, true, mode).await?;
    while let Some(result) = results.recv().await {
        println!("{}", serde_json::to_string(&result)?);
    }

    sweeper.abort();
    Ok(())
}
