//! Stable hashing for cache keys and content deduplication.

use sha2::{Digest, Sha256};

/// Compute the cache key for a (entity, url) detection result.
///
/// The entity id is length-prefixed so the field boundary is
/// unambiguous; two different (entity, url) pairs can never hash the
/// same byte stream.
pub fn detection_cache_key(entity_id: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((entity_id.len() as u64).to_le_bytes());
    hasher.update(entity_id.as_bytes());
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash page content for snapshot write-dedup.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let key1 = detection_cache_key("acme.com", "https://acme.com/pricing");
        let key2 = detection_cache_key("acme.com", "https://acme.com/pricing");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_key_varies_by_entity() {
        let key1 = detection_cache_key("acme.com", "https://acme.com");
        let key2 = detection_cache_key("other.com", "https://acme.com");
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_key_no_field_boundary_collision() {
        // (a, b\nc) must not collide with (a\nb, c)
        let key1 = detection_cache_key("a", "b\nc");
        let key2 = detection_cache_key("a\nb", "c");
        assert_ne!(key1, key2);

        // Shifting bytes across the boundary must also produce new keys.
        assert_ne!(detection_cache_key("ab", "c"), detection_cache_key("a", "bc"));
        assert_ne!(detection_cache_key("", "x"), detection_cache_key("x", ""));
    }

    #[test]
    fn test_key_format() {
        let key = detection_cache_key("acme.com", "https://acme.com");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_differs() {
        assert_ne!(content_hash("a"), content_hash("b"));
        assert_eq!(content_hash("same"), content_hash("same"));
    }
}
