//! TTL-bounded detection-result cache.
//!
//! Cache rows are keyed by a hash of (entity id, url) and carry an
//! explicit expiry timestamp. Reads filter expired rows; a background
//! sweeper deletes them in bulk so the table stays bounded.

use super::connection::StoreDb;
use super::entities::EntitySeed;
use super::hash::detection_cache_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_rusqlite::params;
use tracing::{debug, info, warn};

/// A cached detection result ready to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub url: String,
    pub payload: String,
}

/// Cache table statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total: i64,
    pub live: i64,
    pub expired: i64,
}

impl StoreDb {
    /// Look up cached results for (entity id, url) pairs.
    ///
    /// Returns a map from url to payload. Only rows whose expiry lies in
    /// the future are returned; expired rows are treated as absent even
    /// before the sweeper removes them.
    pub async fn get_cached_results(&self, pairs: &[(String, String)]) -> Result<HashMap<String, String>, Error> {
        let keyed: Vec<(String, String)> = pairs
            .iter()
            .map(|(entity_id, url)| (detection_cache_key(entity_id, url), url.clone()))
            .collect();
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<HashMap<String, String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT payload FROM detection_cache WHERE cache_key = ?1 AND expires_at > ?2",
                )?;

                let mut hits = HashMap::new();
                for (key, url) in keyed {
                    let result = stmt.query_row(params![key, now], |row| row.get::<_, String>(0));
                    match result {
                        Ok(payload) => {
                            hits.insert(url, payload);
                        }
                        Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(hits)
            })
            .await
            .map_err(Error::from)
    }

    /// Write detection results to the cache.
    ///
    /// `entity_of` maps each url to its owning entity id. Before writing a
    /// row the owning entity is upserted so the foreign key always holds.
    /// Each url is written independently; a failure for one url is logged
    /// and skipped without aborting the rest. Returns the urls written.
    pub async fn put_cached_results(
        &self,
        results: &[DetectionResult],
        entity_of: &HashMap<String, String>,
        ttl_hours: i64,
    ) -> Result<Vec<String>, Error> {
        let mut written = Vec::new();

        for result in results {
            let Some(entity_id) = entity_of.get(&result.url) else {
                warn!(url = %result.url, "no entity mapping for cache write, skipping");
                continue;
            };

            if let Err(e) = self
                .put_one_result(entity_id, &result.url, &result.payload, ttl_hours)
                .await
            {
                warn!(url = %result.url, error = %e, "cache write failed, skipping");
                continue;
            }
            written.push(result.url.clone());
        }

        debug!(count = written.len(), "cached detection results");
        Ok(written)
    }

    async fn put_one_result(&self, entity_id: &str, url: &str, payload: &str, ttl_hours: i64) -> Result<(), Error> {
        self.upsert_entity(&EntitySeed::minimal(entity_id, url)).await?;

        let key = detection_cache_key(entity_id, url);
        let entity_id = entity_id.to_string();
        let url = url.to_string();
        let payload = payload.to_string();
        let now = chrono::Utc::now();
        let created_at = now.to_rfc3339();
        let expires_at = (now + chrono::Duration::hours(ttl_hours)).to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO detection_cache (cache_key, entity_id, url, payload, created_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(cache_key) DO UPDATE SET
                        payload = excluded.payload,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at",
                    params![key, entity_id, url, payload, created_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete all expired cache rows. Returns the number removed.
    pub async fn purge_expired_results(&self) -> Result<u64, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = conn.execute("DELETE FROM detection_cache WHERE expires_at <= ?1", params![now])?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop cache rows for specific urls regardless of expiry.
    pub async fn invalidate_results(&self, urls: &[String]) -> Result<u64, Error> {
        let urls = urls.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let mut removed = 0;
                let mut stmt = conn.prepare("DELETE FROM detection_cache WHERE url = ?1")?;
                for url in urls {
                    removed += stmt.execute(params![url])?;
                }
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Cache table row counts split by liveness.
    pub async fn cache_stats(&self) -> Result<CacheStats, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<CacheStats, Error> {
                let total: i64 = conn.query_row("SELECT COUNT(*) FROM detection_cache", [], |row| row.get(0))?;
                let live: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM detection_cache WHERE expires_at > ?1",
                    params![now],
                    |row| row.get(0),
                )?;
                Ok(CacheStats {
                    total,
                    live,
                    expired: total - live,
                })
            })
            .await
            .map_err(Error::from)
    }
}

/// Spawn the periodic expiry sweeper.
///
/// Runs until the returned handle is aborted or the runtime shuts down.
/// Sweep failures are logged and the loop continues.
pub fn spawn_sweeper(db: StoreDb, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match db.purge_expired_results().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept expired cache rows"),
                Err(e) => warn!(error = %e, "cache sweep failed"),
            }
        }
    })
}
