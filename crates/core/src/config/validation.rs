//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `bind_addr` is not a socket address
    /// - `max_manifest_bytes` is 0 or exceeds 10MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `cache_ttl_secs` is not positive
    /// - `user_agent`, `auth_audience` or `auth_issuer` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.max_manifest_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_manifest_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_manifest_bytes > 10 * 1024 * 1024 {
            return Err(ConfigError::Invalid {
                field: "max_manifest_bytes".into(),
                reason: "must not exceed 10MB".into(),
            });
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

        if self.cache_ttl_secs <= 0 {
            return Err(ConfigError::Invalid { field: "cache_ttl_secs".into(), reason: "must be positive".into() });
        }

        for (field, value) in
            [("user_agent", &self.user_agent), ("auth_audience", &self.auth_audience), ("auth_issuer", &self.auth_issuer)]
        {
            if value.is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        if self.auth_secret.is_none() {
            tracing::warn!("auth_secret is not set; every submission will be rejected as not logged in");
        }

        if self.legacy_routes {
            tracing::warn!("legacy /pwas routes are enabled; they accept unauthenticated writes");
        }

        Ok(())
    }
}
