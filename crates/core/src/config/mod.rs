//! Application configuration with layered loading.
//!
//! Loading precedence (highest wins):
//! 1. Environment variables (RIVALWATCH_*)
//! 2. TOML config file (if RIVALWATCH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::limit::RateLimitConfig;

mod validation;

pub use validation::ConfigError;

/// Per-provider rate limit table.
///
/// One entry per upstream provider the pipeline talks to. Values mirror the
/// quotas of the deployed services; override any field via
/// `RIVALWATCH_LIMITS__<PROVIDER>__<FIELD>` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLimits {
    /// Structured-analysis (LLM) calls.
    #[serde(default = "default_llm_limit")]
    pub llm: RateLimitConfig,

    /// Web-search provider calls.
    #[serde(default = "default_search_limit")]
    pub search: RateLimitConfig,

    /// Realtime page scrapes.
    #[serde(default = "default_scrape_limit")]
    pub scrape: RateLimitConfig,

    /// Background tracking scrapes (rolling comparisons).
    #[serde(default = "default_scrape_background_limit")]
    pub scrape_background: RateLimitConfig,

    /// Archived-snapshot service lookups.
    #[serde(default = "default_archive_lookup_limit")]
    pub archive_lookup: RateLimitConfig,
}

fn default_llm_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 4000, window_secs: 60, max_concurrent: 32 }
}

fn default_search_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 100, window_secs: 60, max_concurrent: 8 }
}

fn default_scrape_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 100, window_secs: 60, max_concurrent: 3 }
}

fn default_scrape_background_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 100, window_secs: 60, max_concurrent: 2 }
}

fn default_archive_lookup_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 1000, window_secs: 60, max_concurrent: 12 }
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            llm: default_llm_limit(),
            search: default_search_limit(),
            scrape: default_scrape_limit(),
            scrape_background: default_scrape_background_limit(),
            archive_lookup: default_archive_lookup_limit(),
        }
    }
}

impl ProviderLimits {
    /// Flatten into the provider-name keyed table the rate limiter consumes.
    pub fn as_table(&self) -> HashMap<String, RateLimitConfig> {
        HashMap::from([
            ("llm".to_string(), self.llm.clone()),
            ("search".to_string(), self.search.clone()),
            ("scrape".to_string(), self.scrape.clone()),
            ("scrape-background".to_string(), self.scrape_background.clone()),
            ("archive-lookup".to_string(), self.archive_lookup.clone()),
        ])
    }
}

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite store.
    ///
    /// Set via RIVALWATCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Default TTL for cached analysis results, in hours.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// URLs per orchestrator batch (also the local fan-out bound).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How many days back to look for archive comparisons.
    #[serde(default = "default_archive_day_delta")]
    pub archive_day_delta: i64,

    /// Snapshot tag for rolling comparisons.
    #[serde(default = "default_rolling_tag")]
    pub rolling_tag: String,

    /// Concurrent structured-analysis calls per pipeline run.
    #[serde(default = "default_analysis_fanout")]
    pub analysis_fanout: usize,

    /// Seconds between expired-cache sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Per-provider rate limits.
    #[serde(default)]
    pub limits: ProviderLimits,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./rivalwatch.sqlite")
}

fn default_user_agent() -> String {
    "rivalwatch/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_cache_ttl_hours() -> i64 {
    72
}

fn default_batch_size() -> usize {
    5
}

fn default_archive_day_delta() -> i64 {
    20
}

fn default_rolling_tag() -> String {
    "default".into()
}

fn default_analysis_fanout() -> usize {
    3
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            cache_ttl_hours: default_cache_ttl_hours(),
            batch_size: default_batch_size(),
            archive_day_delta: default_archive_day_delta(),
            rolling_tag: default_rolling_tag(),
            analysis_fanout: default_analysis_fanout(),
            sweep_interval_secs: default_sweep_interval_secs(),
            limits: ProviderLimits::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sweep interval as Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RIVALWATCH_`
    /// 2. TOML file from `RIVALWATCH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or validation fails
    /// after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RIVALWATCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RIVALWATCH_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./rivalwatch.sqlite"));
        assert_eq!(config.user_agent, "rivalwatch/0.1");
        assert_eq!(config.cache_ttl_hours, 72);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.archive_day_delta, 20);
        assert_eq!(config.analysis_fanout, 3);
        assert_eq!(config.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_provider_limits_table() {
        let table = ProviderLimits::default().as_table();
        assert_eq!(table.len(), 5);
        assert_eq!(table["scrape"].max_concurrent, 3);
        assert_eq!(table["scrape-background"].max_concurrent, 2);
        assert_eq!(table["archive-lookup"].max_requests, 1000);
        assert!(!table.contains_key("unknown"));
    }
}
