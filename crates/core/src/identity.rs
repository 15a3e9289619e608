//! Identity resolution for tracked entities.
//!
//! Maps (url, display name) inputs onto stable entity ids so that
//! `https://www.acme.com/`, `http://acme.com/pricing`, and "Acme Corp"
//! all land on the same row. The id is the normalized domain; urls with
//! no usable host fall back to a hash-derived id.

use crate::Error;
use crate::store::{EntitySeed, StoreDb};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

/// Corporate suffixes stripped when deriving a name token.
const NAME_SUFFIXES: &[&str] = &["inc", "ltd", "llc", "corp", "co", "group", "company", "corporation"];

/// Normalize a url to its bare domain.
///
/// Lowercases the host and strips a leading `www.`. A missing scheme is
/// treated as https.
pub fn normalized_domain(url: &str) -> Result<String, Error> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty url".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(format!("no host in {trimmed}")))?;

    let host = host.to_lowercase();
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Reduce a display name to a comparison token.
///
/// Lowercases, drops corporate suffixes, and strips everything that is
/// not alphanumeric. "Acme Corp." and "acme" both yield "acme".
pub fn name_token(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| {
            let bare: String = word.chars().filter(char::is_ascii_alphanumeric).collect();
            !NAME_SUFFIXES.contains(&bare.as_str())
        })
        .flat_map(|word| word.chars().filter(char::is_ascii_alphanumeric).collect::<Vec<_>>())
        .collect()
}

fn hash_fallback_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("anon-{}", &digest[..12])
}

/// Resolves inputs to stable entity ids backed by the entity table.
#[derive(Clone)]
pub struct IdentityResolver {
    db: StoreDb,
}

impl IdentityResolver {
    pub fn new(db: StoreDb) -> Self {
        Self { db }
    }

    /// Resolve a (url, display name) pair to an entity id.
    ///
    /// Resolution order: exact stored primary-url match, then domain-key
    /// match, then a fuzzy name match confirmed by domain equality, then a
    /// freshly minted id. Every path upserts the entity so repeated calls
    /// converge on one enriched row. Fuzzy merges are best effort and are
    /// not undone if later inputs disagree.
    pub async fn resolve(&self, url: &str, display_name: &str) -> Result<String, Error> {
        if let Some(id) = self.db.find_entity_by_primary_url(url).await? {
            self.enrich(&id, display_name, url).await?;
            return Ok(id);
        }

        let domain = match normalized_domain(url) {
            Ok(domain) => domain,
            Err(_) => {
                let id = hash_fallback_id(url);
                debug!(url, id, "url has no usable host, using hash id");
                self.enrich(&id, display_name, url).await?;
                return Ok(id);
            }
        };

        if self.db.get_entity(&domain).await?.is_some() {
            self.enrich(&domain, display_name, url).await?;
            return Ok(domain);
        }

        if !display_name.trim().is_empty() {
            let token = name_token(display_name);
            let candidates = self.db.entity_candidates(display_name.trim(), &token).await?;
            for candidate in candidates {
                let candidate_domain = normalized_domain(&candidate.primary_url).ok();
                if candidate_domain.as_deref() == Some(domain.as_str()) {
                    debug!(url, entity_id = %candidate.id, "fuzzy name match confirmed by domain");
                    self.enrich(&candidate.id, display_name, url).await?;
                    return Ok(candidate.id);
                }
            }
        }

        debug!(url, entity_id = %domain, "minting new entity");
        self.enrich(&domain, display_name, url).await?;
        Ok(domain)
    }

    /// Upsert an entity with a caller-chosen id, bypassing resolution.
    pub async fn ensure_exists(&self, id: &str, display_name: &str, url: &str) -> Result<(), Error> {
        self.enrich(id, display_name, url).await
    }

    async fn enrich(&self, id: &str, display_name: &str, url: &str) -> Result<(), Error> {
        self.db
            .upsert_entity(&EntitySeed {
                id: id.to_string(),
                display_name: display_name.trim().to_string(),
                primary_url: url.trim().to_string(),
                description: String::new(),
                source: "resolver".to_string(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_domain() {
        assert_eq!(normalized_domain("https://www.Acme.com/pricing").unwrap(), "acme.com");
        assert_eq!(normalized_domain("acme.com").unwrap(), "acme.com");
        assert_eq!(normalized_domain("http://acme.com/").unwrap(), "acme.com");
        assert!(normalized_domain("").is_err());
    }

    #[test]
    fn test_name_token() {
        assert_eq!(name_token("Acme Corp."), "acme");
        assert_eq!(name_token("Acme, Inc"), "acme");
        assert_eq!(name_token("Globex Group"), "globex");
        assert_eq!(name_token("Initech"), "initech");
    }

    #[tokio::test]
    async fn test_resolve_mints_and_reuses() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let resolver = IdentityResolver::new(db.clone());

        let id1 = resolver.resolve("https://www.acme.com/", "Acme").await.unwrap();
        let id2 = resolver.resolve("http://acme.com/pricing", "Acme Corp").await.unwrap();
        assert_eq!(id1, "acme.com");
        assert_eq!(id1, id2);
        assert_eq!(db.count_entities().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolve_exact_primary_url() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let resolver = IdentityResolver::new(db.clone());

        resolver.ensure_exists("custom-id", "Acme", "https://acme.com").await.unwrap();
        let id = resolver.resolve("https://acme.com", "").await.unwrap();
        assert_eq!(id, "custom-id");
    }

    #[tokio::test]
    async fn test_resolve_fuzzy_requires_domain_match() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let resolver = IdentityResolver::new(db.clone());

        // Same name, different domain: must not merge.
        resolver.resolve("https://acme.com", "Acme").await.unwrap();
        let other = resolver.resolve("https://acme.io", "Acme").await.unwrap();
        assert_eq!(other, "acme.io");
        assert_eq!(db.count_entities().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resolve_hash_fallback() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let resolver = IdentityResolver::new(db.clone());

        let id = resolver.resolve("file:///tmp/page.html", "Local").await.unwrap();
        assert!(id.starts_with("anon-"));

        let again = resolver.resolve("file:///tmp/page.html", "Local").await.unwrap();
        assert_eq!(id, again);
    }
}
