//! Change-detection pipeline: compares competitor pages against archive
//! snapshots or stored baselines, analyzes what changed, and caches the
//! outcomes.

pub mod archive;
pub mod diff;
pub mod facade;
pub mod rolling;
pub mod sources;

pub use archive::ArchiveComparator;
pub use diff::{DiffOutcome, DiffReport, MissingSide, diff_report, unified_diff};
pub use facade::{CompareMode, EntityInput, Pipeline, PipelineResult};
pub use rolling::RollingComparator;
pub use sources::{ArchiveSource, ChangeAnalyzer, DiffSummaryAnalyzer, PageSource, RateLimitedArchive, RateLimitedFetcher};
