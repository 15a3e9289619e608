//! Page-content snapshot history.
//!
//! Snapshots are append-only rows keyed by (url, tag). Writes are
//! deduplicated against the latest stored row by content hash so a page
//! that has not changed costs nothing.

use super::connection::StoreDb;
use super::hash::content_hash;
use crate::Error;
use serde::Serialize;
use std::collections::HashMap;
use tokio_rusqlite::params;
use tracing::debug;

/// A stored content snapshot row.
#[derive(Debug, Clone, Serialize)]
pub struct ContentSnapshot {
    pub id: i64,
    pub url: String,
    pub tag: String,
    pub content_hash: String,
    pub content: String,
    pub created_at: String,
}

impl StoreDb {
    /// Latest stored content per url under a tag.
    ///
    /// Urls with no history are simply absent from the map.
    pub async fn latest_content(&self, urls: &[String], tag: &str) -> Result<HashMap<String, String>, Error> {
        let urls = urls.to_vec();
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<HashMap<String, String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT content FROM content_snapshots
                    WHERE url = ?1 AND tag = ?2
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1",
                )?;

                let mut latest = HashMap::new();
                for url in urls {
                    let result = stmt.query_row(params![url, tag], |row| row.get::<_, String>(0));
                    match result {
                        Ok(content) => {
                            latest.insert(url, content);
                        }
                        Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(latest)
            })
            .await
            .map_err(Error::from)
    }

    /// Append new snapshots, skipping urls whose content is unchanged.
    ///
    /// Unchanged means the hash matches the latest stored row for the same
    /// (url, tag). Returns the number of rows actually written.
    pub async fn save_content(&self, contents: &HashMap<String, String>, tag: &str) -> Result<usize, Error> {
        let contents = contents.clone();
        let owned_tag = tag.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let written = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let mut latest_hash = conn.prepare(
                    "SELECT content_hash FROM content_snapshots
                    WHERE url = ?1 AND tag = ?2
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1",
                )?;
                let mut insert = conn.prepare(
                    "INSERT INTO content_snapshots (url, tag, content_hash, content, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;

                let mut written = 0;
                for (url, content) in &contents {
                    let hash = content_hash(content);
                    let previous = latest_hash.query_row(params![url, owned_tag], |row| row.get::<_, String>(0));
                    match previous {
                        Ok(prev_hash) if prev_hash == hash => continue,
                        Ok(_) | Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(e.into()),
                    }
                    insert.execute(params![url, owned_tag, hash, content, now])?;
                    written += 1;
                }
                Ok(written)
            })
            .await
            .map_err(Error::from)?;

        debug!(written, tag, "saved content snapshots");
        Ok(written)
    }

    /// Snapshot history for one url, newest first.
    pub async fn content_history(&self, url: &str, tag: &str, limit: u32) -> Result<Vec<ContentSnapshot>, Error> {
        let url = url.to_string();
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<ContentSnapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, url, tag, content_hash, content, created_at
                    FROM content_snapshots
                    WHERE url = ?1 AND tag = ?2
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?3",
                )?;

                let rows = stmt.query_map(params![url, tag, limit], |row| {
                    Ok(ContentSnapshot {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        tag: row.get(2)?,
                        content_hash: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?;

                let mut snapshots = Vec::new();
                for row in rows {
                    snapshots.push(row?);
                }
                Ok(snapshots)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete snapshots older than `days`, optionally scoped to one tag.
    pub async fn purge_content_older_than(&self, days: u32, tag: Option<&str>) -> Result<u64, Error> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        let tag = tag.map(String::from);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = match tag {
                    Some(tag) => conn.execute(
                        "DELETE FROM content_snapshots WHERE created_at < ?1 AND tag = ?2",
                        params![cutoff, tag],
                    )?,
                    None => conn.execute("DELETE FROM content_snapshots WHERE created_at < ?1", params![cutoff])?,
                };
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }
}
