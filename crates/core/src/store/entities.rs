//! Tracked-entity table operations.
//!
//! One row per monitored competitor, keyed by a stable id (normalized
//! domain). Rows are created on first sighting and enriched over time;
//! they are never destroyed by the pipeline.

use super::connection::StoreDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A tracked competitor entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: String,
    pub display_name: String,
    pub primary_url: String,
    pub description: String,
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Seed data for creating or enriching an entity row.
#[derive(Debug, Clone, Default)]
pub struct EntitySeed {
    pub id: String,
    pub display_name: String,
    pub primary_url: String,
    pub description: String,
    pub source: String,
}

impl EntitySeed {
    /// Minimal seed used when a cache write references an unseen entity.
    pub fn minimal(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: String::new(),
            primary_url: url.to_string(),
            description: String::new(),
            source: "cache-writer".to_string(),
        }
    }
}

impl StoreDb {
    /// Insert or enrich an entity row.
    ///
    /// Upsert with fill-empty-only semantics: a later sighting only fills
    /// fields that are currently empty, never overwriting populated data
    /// with weaker values. Idempotent per id, safe under concurrent writers.
    pub async fn upsert_entity(&self, seed: &EntitySeed) -> Result<(), Error> {
        let seed = seed.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let source = if seed.source.is_empty() { "resolver".to_string() } else { seed.source };
                conn.execute(
                    "INSERT INTO entities (id, display_name, primary_url, description, source, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        display_name = CASE WHEN entities.display_name = ''
                                            THEN excluded.display_name ELSE entities.display_name END,
                        primary_url = CASE WHEN entities.primary_url = ''
                                           THEN excluded.primary_url ELSE entities.primary_url END,
                        description = CASE WHEN entities.description = ''
                                           THEN excluded.description ELSE entities.description END,
                        updated_at = excluded.updated_at",
                    params![seed.id, seed.display_name, seed.primary_url, seed.description, source, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entity by id.
    pub async fn get_entity(&self, id: &str) -> Result<Option<TrackedEntity>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<TrackedEntity>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, primary_url, description, source, created_at, updated_at
                    FROM entities WHERE id = ?1",
                )?;

                let result = stmt.query_row(params![id], |row| {
                    Ok(TrackedEntity {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        primary_url: row.get(2)?,
                        description: row.get(3)?,
                        source: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                });

                match result {
                    Ok(e) => Ok(Some(e)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Find an entity id by exact stored primary URL.
    pub async fn find_entity_by_primary_url(&self, url: &str) -> Result<Option<String>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT id FROM entities WHERE primary_url = ?1", params![url], |row| {
                    row.get(0)
                });

                match result {
                    Ok(id) => Ok(Some(id)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Fuzzy candidate set for name-based identity resolution.
    ///
    /// Matches entities whose display name contains `name`
    /// (case-insensitive), or whose id contains the name-derived `token`.
    pub async fn entity_candidates(&self, name: &str, token: &str) -> Result<Vec<TrackedEntity>, Error> {
        let name = name.to_lowercase();
        let token = token.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<TrackedEntity>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, primary_url, description, source, created_at, updated_at
                    FROM entities
                    WHERE (length(?1) > 0 AND instr(lower(display_name), ?1) > 0)
                       OR (length(?2) > 0 AND instr(id, ?2) > 0)
                    ORDER BY created_at ASC",
                )?;

                let rows = stmt.query_map(params![name, token], |row| {
                    Ok(TrackedEntity {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        primary_url: row.get(2)?,
                        description: row.get(3)?,
                        source: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                })?;

                let mut entities = Vec::new();
                for row in rows {
                    entities.push(row?);
                }
                Ok(entities)
            })
            .await
            .map_err(Error::from)
    }

    /// Total entity rows (used by stats and tests).
    pub async fn count_entities(&self) -> Result<i64, Error> {
        self.conn
            .call(|conn| -> Result<i64, Error> {
                let count = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(id: &str, name: &str, url: &str) -> EntitySeed {
        EntitySeed {
            id: id.to_string(),
            display_name: name.to_string(),
            primary_url: url.to_string(),
            description: String::new(),
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme", "https://acme.com")).await.unwrap();

        let entity = db.get_entity("acme.com").await.unwrap().unwrap();
        assert_eq!(entity.display_name, "Acme");
        assert_eq!(entity.primary_url, "https://acme.com");
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme", "https://acme.com")).await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme", "https://acme.com")).await.unwrap();

        assert_eq!(db.count_entities().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_never_weakens_populated_fields() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme Corporation", "https://acme.com"))
            .await
            .unwrap();

        // A minimal cache-writer seed must not blank out the enriched name.
        db.upsert_entity(&EntitySeed::minimal("acme.com", "https://acme.com/pricing"))
            .await
            .unwrap();

        let entity = db.get_entity("acme.com").await.unwrap().unwrap();
        assert_eq!(entity.display_name, "Acme Corporation");
        assert_eq!(entity.primary_url, "https://acme.com");
    }

    #[tokio::test]
    async fn test_upsert_fills_empty_fields() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.upsert_entity(&EntitySeed::minimal("acme.com", "https://acme.com")).await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme", "https://acme.com")).await.unwrap();

        let entity = db.get_entity("acme.com").await.unwrap().unwrap();
        assert_eq!(entity.display_name, "Acme");
    }

    #[tokio::test]
    async fn test_find_by_primary_url() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme", "https://acme.com")).await.unwrap();

        let id = db.find_entity_by_primary_url("https://acme.com").await.unwrap();
        assert_eq!(id.as_deref(), Some("acme.com"));

        let missing = db.find_entity_by_primary_url("https://other.com").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_entity_candidates() {
        let db = StoreDb::open_in_memory().await.unwrap();
        db.upsert_entity(&seed("acme.com", "Acme Corporation", "https://acme.com"))
            .await
            .unwrap();
        db.upsert_entity(&seed("globex.com", "Globex", "https://globex.com")).await.unwrap();

        let by_name = db.entity_candidates("acme", "").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, "acme.com");

        let by_token = db.entity_candidates("", "globex").await.unwrap();
        assert_eq!(by_token.len(), 1);
        assert_eq!(by_token[0].id, "globex.com");

        let none = db.entity_candidates("initech", "initech").await.unwrap();
        assert!(none.is_empty());
    }
}
