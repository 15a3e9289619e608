//! Wayback Machine snapshot lookup.
//!
//! The archive redirects a dated lookup URL to the closest stored
//! snapshot; the snapshot's actual capture time is recovered from the
//! final redirected URL rather than trusted from the request.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;

use rivalwatch_core::Error;

static SNAPSHOT_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/web/(\d{14})").expect("static regex is valid"));

/// A located archive snapshot.
#[derive(Debug, Clone)]
pub struct ArchiveRef {
    /// URL of the archived copy, fetchable like any page.
    pub archive_url: String,
    /// When the snapshot was actually captured.
    pub timestamp: DateTime<Utc>,
    /// Distance in whole days between the requested date and the capture.
    pub days_difference: i64,
}

/// Client for the Wayback Machine availability redirect.
pub struct ArchiveClient {
    http: Client,
}

impl ArchiveClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| Error::ArchiveLookup(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Find the snapshot closest to `target` for a URL.
    ///
    /// Returns `Ok(None)` when the archive has no snapshot at all; other
    /// failures are errors. A snapshot far from the target date is still
    /// returned, with `days_difference` reporting the distance.
    pub async fn nearest_snapshot(&self, url: &str, target: NaiveDate) -> Result<Option<ArchiveRef>, Error> {
        let lookup = format!("https://web.archive.org/web/{}000000/{}", target.format("%Y%m%d"), url);

        let response = self
            .http
            .get(&lookup)
            .send()
            .await
            .map_err(|e| Error::ArchiveLookup(format!("archive request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::ArchiveLookup(format!("archive returned status {}", status.as_u16())));
        }

        let final_url = response.url().to_string();
        let Some(stamp) = SNAPSHOT_TIMESTAMP
            .captures(&final_url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            // Landed somewhere without a capture timestamp, treat as absent.
            tracing::debug!(url, final_url, "no snapshot timestamp in archive redirect");
            return Ok(None);
        };

        let timestamp = parse_snapshot_timestamp(&stamp)?;
        let days_difference = (timestamp.date_naive() - target).num_days().abs();

        tracing::debug!(url, %timestamp, days_difference, "resolved archive snapshot");

        Ok(Some(ArchiveRef { archive_url: final_url, timestamp, days_difference }))
    }
}

fn parse_snapshot_timestamp(stamp: &str) -> Result<DateTime<Utc>, Error> {
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
        .map_err(|e| Error::ArchiveLookup(format!("bad snapshot timestamp {}: {}", stamp, e)))?;
    Ok(naive.and_utc())
}
