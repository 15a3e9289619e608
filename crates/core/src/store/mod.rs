//! SQLite-backed persistence for entities, cached results, and content
//! snapshots.

pub mod connection;
pub mod content;
pub mod entities;
pub mod hash;
pub mod migrations;
pub mod results;

pub use crate::Error;
pub use connection::StoreDb;
pub use content::ContentSnapshot;
pub use entities::{EntitySeed, TrackedEntity};
pub use results::{CacheStats, DetectionResult, spawn_sweeper};
