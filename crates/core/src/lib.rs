//! Core types and persistence for the rivalwatch change-detection
//! pipeline: configuration, rate limiting, identity resolution, and the
//! SQLite store backing the result cache and content history.

pub mod config;
pub mod error;
pub mod identity;
pub mod limit;
pub mod store;

pub use config::{AppConfig, ConfigError, ProviderLimits};
pub use error::Error;
pub use identity::{IdentityResolver, name_token, normalized_domain};
pub use limit::{RateLimitConfig, RateLimiter};
pub use store::{CacheStats, ContentSnapshot, DetectionResult, EntitySeed, StoreDb, TrackedEntity, spawn_sweeper};
