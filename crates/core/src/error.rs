//! Unified error type for the rivalwatch pipeline.
//!
//! Provider failures (scrape/archive fetches) surface here as typed variants;
//! the orchestrators recover them into per-URL unavailability outcomes so a
//! single bad URL never aborts a batch.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by all rivalwatch crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL list).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL failed to parse or canonicalize.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// HTTP error response or transport failure from a scrape.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Fetch timed out.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response exceeded the configured byte budget.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Archive-snapshot service lookup failed.
    #[error("ARCHIVE_ERROR: {0}")]
    ArchiveLookup(String),

    /// Structured-analysis step failed for a diff.
    #[error("ANALYZE_FAILED: {0}")]
    AnalyzeFailed(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
