//! HTTP-facing clients for the rivalwatch pipeline: page fetching with
//! visible-text extraction, and archive snapshot lookup.

pub mod archive;
pub mod extract;
pub mod fetch;

pub use archive::{ArchiveClient, ArchiveRef};
pub use extract::html_to_text;
pub use fetch::{FetchClient, FetchConfig, PageText, UrlError, canonicalize};
