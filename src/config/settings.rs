//! # Configuration Settings
//!
//! Defines the configuration structure for the connection backplane.

use crate::domain::Category;
use crate::errors::{BackplaneError, Result};
use crate::secrets::CredentialKeyConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Store holding the connection records
    #[validate(nested)]
    pub store: DatabaseConfig,

    /// Key used to open credential envelopes
    pub credentials: CredentialKeyConfig,

    /// Defaults applied to backend clients
    #[validate(nested)]
    pub backends: BackendSettings,

    /// Logging and health-check configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Connections activated at startup
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// Load every section from the environment
    pub fn from_env() -> Result<Self> {
        let config = Self {
            store: DatabaseConfig::from_env(),
            credentials: CredentialKeyConfig::from_env()?,
            backends: BackendSettings::from_env(),
            observability: ObservabilityConfig::from_env(),
            bootstrap: BootstrapConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(BackplaneError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.store.min_connections > self.store.max_connections {
            return Err(BackplaneError::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        if !self.store.url.starts_with("sqlite:") {
            return Err(BackplaneError::validation("Record store URL must start with 'sqlite:'"));
        }

        Ok(())
    }
}

/// Record-store database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 60, message = "Connect timeout must be between 1 and 60 seconds"))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/backplane.db".to_string(),
            max_connections: 5,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("BACKPLANE_DATABASE_URL").unwrap_or(defaults.url),
            max_connections: env_parse("BACKPLANE_DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            min_connections: env_parse("BACKPLANE_DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.min_connections),
            connect_timeout_seconds: env_parse("BACKPLANE_DATABASE_CONNECT_TIMEOUT_SECONDS")
                .unwrap_or(defaults.connect_timeout_seconds),
            idle_timeout_seconds: env_parse("BACKPLANE_DATABASE_IDLE_TIMEOUT_SECONDS")
                .unwrap_or(defaults.idle_timeout_seconds),
        }
    }
}

/// Defaults handed to every backend client the factory builds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackendSettings {
    /// Pool size per embedded relational store
    #[validate(range(min = 1, max = 64, message = "SQLite pool size must be between 1 and 64"))]
    pub sqlite_max_connections: u32,

    /// How long SQLite waits on a locked database
    pub sqlite_busy_timeout_seconds: u64,

    /// Pool size for networked relational stores
    #[validate(range(min = 1, max = 100, message = "PostgreSQL pool size must be between 1 and 100"))]
    pub postgres_max_connections: u32,

    /// Time allowed to establish a networked relational session
    #[validate(range(min = 1, max = 120, message = "Connect timeout must be between 1 and 120 seconds"))]
    pub postgres_connect_timeout_seconds: u64,

    /// Per-request timeout for HTTP APIs whose credentials omit one
    #[validate(range(min = 1, max = 300, message = "HTTP timeout must be between 1 and 300 seconds"))]
    pub http_timeout_seconds: u64,

    /// Directory for the default analytics stores
    pub analytics_data_dir: PathBuf,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            sqlite_max_connections: 5,
            sqlite_busy_timeout_seconds: 5,
            postgres_max_connections: 10,
            postgres_connect_timeout_seconds: 10,
            http_timeout_seconds: 30,
            analytics_data_dir: PathBuf::from("data/analytics"),
        }
    }
}

impl BackendSettings {
    pub fn sqlite_busy_timeout(&self) -> Duration {
        Duration::from_secs(self.sqlite_busy_timeout_seconds)
    }

    pub fn postgres_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.postgres_connect_timeout_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sqlite_max_connections: env_parse("BACKPLANE_SQLITE_MAX_CONNECTIONS")
                .unwrap_or(defaults.sqlite_max_connections),
            sqlite_busy_timeout_seconds: env_parse("BACKPLANE_SQLITE_BUSY_TIMEOUT_SECONDS")
                .unwrap_or(defaults.sqlite_busy_timeout_seconds),
            postgres_max_connections: env_parse("BACKPLANE_POSTGRES_MAX_CONNECTIONS")
                .unwrap_or(defaults.postgres_max_connections),
            postgres_connect_timeout_seconds: env_parse("BACKPLANE_POSTGRES_CONNECT_TIMEOUT_SECONDS")
                .unwrap_or(defaults.postgres_connect_timeout_seconds),
            http_timeout_seconds: env_parse("BACKPLANE_HTTP_TIMEOUT_SECONDS")
                .unwrap_or(defaults.http_timeout_seconds),
            analytics_data_dir: std::env::var("BACKPLANE_ANALYTICS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.analytics_data_dir),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Interval between health sweeps in `backplane run`
    #[validate(range(min = 1, max = 3600, message = "Health check interval must be between 1 and 3600 seconds"))]
    pub health_check_interval_seconds: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "backplane".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            health_check_interval_seconds: 60,
        }
    }
}

impl ObservabilityConfig {
    /// Get health check interval as Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("BACKPLANE_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("BACKPLANE_LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            json_logging: std::env::var("BACKPLANE_LOG_JSON")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.json_logging),
            health_check_interval_seconds: env_parse("BACKPLANE_HEALTH_CHECK_INTERVAL_SECONDS")
                .unwrap_or(defaults.health_check_interval_seconds),
        }
    }
}

/// Connection ids to activate per category at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub active: BTreeMap<Category, i64>,
}

impl BootstrapConfig {
    /// Read `BACKPLANE_ACTIVE_<CATEGORY>` variables, e.g. `BACKPLANE_ACTIVE_BROKER=8`
    pub fn from_env() -> Result<Self> {
        let mut active = BTreeMap::new();
        for category in Category::ALL {
            let key = format!("BACKPLANE_ACTIVE_{}", category.as_str().to_uppercase());
            if let Ok(raw) = std::env::var(&key) {
                let id = raw.trim().parse::<i64>().map_err(|e| {
                    BackplaneError::config(format!("Invalid connection id in {}: {}", key, e))
                })?;
                active.insert(category, id);
            }
        }
        Ok(Self { active })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
