//! Configuration validation rules.
//!
//! Validation runs once after loading; invalid configuration is the only
//! error in this system that is allowed to abort startup.

use crate::config::AppConfig;
use crate::limit::RateLimitConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `cache_ttl_hours`, `batch_size`, `archive_day_delta`, or
    ///   `analysis_fanout` is 0 or negative
    /// - any provider limit has a zero field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.cache_ttl_hours <= 0 {
            return Err(ConfigError::Invalid { field: "cache_ttl_hours".into(), reason: "must be positive".into() });
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid { field: "batch_size".into(), reason: "must be at least 1".into() });
        }

        if self.archive_day_delta <= 0 {
            return Err(ConfigError::Invalid { field: "archive_day_delta".into(), reason: "must be positive".into() });
        }

        if self.analysis_fanout == 0 {
            return Err(ConfigError::Invalid { field: "analysis_fanout".into(), reason: "must be at least 1".into() });
        }

        for (name, limit) in self.limits.as_table() {
            validate_limit(&name, &limit)?;
        }

        Ok(())
    }
}

fn validate_limit(name: &str, limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if limit.max_requests == 0 {
        return Err(ConfigError::Invalid {
            field: format!("limits.{name}.max_requests"),
            reason: "must be at least 1".into(),
        });
    }
    if limit.window_secs == 0 {
        return Err(ConfigError::Invalid {
            field: format!("limits.{name}.window_secs"),
            reason: "must be at least 1".into(),
        });
    }
    if limit.max_concurrent == 0 {
        return Err(ConfigError::Invalid {
            field: format!("limits.{name}.max_concurrent"),
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}
