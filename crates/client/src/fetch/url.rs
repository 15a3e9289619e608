//! URL canonicalization so cache keys and store lookups agree.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string.
///
/// Trims whitespace, defaults a missing scheme to https, lowercases the
/// host, and drops the fragment. The query string is kept as written so
/// distinct query pages stay distinct.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(lowered.as_str()))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("acme.com/pricing").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("acme.com"));
        assert_eq!(url.path(), "/pricing");
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://ACME.Com/Pricing").unwrap();
        assert_eq!(url.host_str(), Some("acme.com"));
        // Path case is significant and must survive.
        assert_eq!(url.path(), "/Pricing");
    }

    #[test]
    fn test_canonicalize_strips_fragment_keeps_query() {
        let url = canonicalize("https://acme.com/p?plan=pro#features").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("plan=pro"));
    }

    #[test]
    fn test_canonicalize_trims_whitespace() {
        let url = canonicalize("  https://acme.com  ").unwrap();
        assert_eq!(url.as_str(), "https://acme.com/");
    }

    #[test]
    fn test_canonicalize_rejects_empty_and_odd_schemes() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_http_allowed() {
        let url = canonicalize("http://acme.com").unwrap();
        assert_eq!(url.scheme(), "http");
    }
}
