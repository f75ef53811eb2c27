//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PWADIR_*)
//! 2. TOML config file (if PWADIR_CONFIG_FILE set)
//! 3. Built-in defaults

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PWADIR_*)
/// 2. TOML config file (if PWADIR_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    ///
    /// Set via PWADIR_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path to the SQLite database holding records and cached pages.
    ///
    /// Set via PWADIR_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for manifest fetches.
    ///
    /// Set via PWADIR_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum manifest size in bytes.
    ///
    /// Set via PWADIR_MAX_MANIFEST_BYTES environment variable.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,

    /// Manifest fetch timeout in milliseconds.
    ///
    /// Set via PWADIR_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether rendered pages are cached for anonymous GET requests.
    ///
    /// Set via PWADIR_CACHE_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Lifetime of a cached page in seconds.
    ///
    /// Set via PWADIR_CACHE_TTL_SECS environment variable.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,

    /// Allow manifest fetches to private/loopback addresses.
    ///
    /// Set via PWADIR_ALLOW_PRIVATE_HOSTS environment variable. Development only.
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Mount the legacy `/pwas` CRUD routes.
    ///
    /// Set via PWADIR_LEGACY_ROUTES environment variable.
    #[serde(default)]
    pub legacy_routes: bool,

    /// HS256 secret used to verify identity tokens.
    ///
    /// Set via PWADIR_AUTH_SECRET environment variable. Without it every
    /// submission is rejected as not logged in.
    #[serde(default)]
    pub auth_secret: Option<String>,

    /// Expected `aud` claim of identity tokens.
    ///
    /// Set via PWADIR_AUTH_AUDIENCE environment variable.
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Expected `iss` claim of identity tokens.
    ///
    /// Set via PWADIR_AUTH_ISSUER environment variable.
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./pwa-directory.sqlite")
}

fn default_user_agent() -> String {
    "pwa-directory/0.1".into()
}

fn default_max_manifest_bytes() -> usize {
    1_048_576 // 1MB
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_cache_ttl_secs() -> i64 {
    3600
}

fn default_auth_audience() -> String {
    "pwa-directory".into()
}

fn default_auth_issuer() -> String {
    "pwa-directory".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_manifest_bytes: default_max_manifest_bytes(),
            timeout_ms: default_timeout_ms(),
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
            allow_private_hosts: false,
            legacy_routes: false,
            auth_secret: None,
            auth_audience: default_auth_audience(),
            auth_issuer: default_auth_issuer(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `bind_addr` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            field: "bind_addr".into(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PWADIR_`
    /// 2. TOML file from `PWADIR_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PWADIR_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PWADIR_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Identity token secret, if configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the secret is not set.
    pub fn require_auth_secret(&self) -> Result<&str, ConfigError> {
        self.auth_secret.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "auth_secret".into(),
            hint: "Set PWADIR_AUTH_SECRET environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("./pwa-directory.sqlite"));
        assert_eq!(config.user_agent, "pwa-directory/0.1");
        assert_eq!(config.max_manifest_bytes, 1_048_576);
        assert_eq!(config.timeout_ms, 10_000);
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert!(!config.allow_private_hosts);
        assert!(!config.legacy_routes);
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);

        let config = AppConfig { bind_addr: "not an address".into(), ..Default::default() };
        assert!(matches!(config.socket_addr(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_require_auth_secret() {
        let config = AppConfig::default();
        assert!(matches!(config.require_auth_secret(), Err(ConfigError::Missing { .. })));

        let config = AppConfig { auth_secret: Some("s3cret".into()), ..Default::default() };
        assert_eq!(config.require_auth_secret().unwrap(), "s3cret");
    }
}
