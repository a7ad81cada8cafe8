//! Connection records and the closed vocabularies that describe them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical role a connection serves. Callers address categories, never backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Authentication/user store
    Auth,
    /// Analytical store(s)
    Analytics,
    /// AI/LLM provider API
    AiLlm,
    /// Brokerage API
    Broker,
    /// Social-media API
    SocialMedia,
}

impl Category {
    /// Every category, in routing order
    pub const ALL: [Category; 5] =
        [Self::Auth, Self::Analytics, Self::AiLlm, Self::Broker, Self::SocialMedia];

    /// Get the database representation of this category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Analytics => "analytics",
            Self::AiLlm => "ai_llm",
            Self::Broker => "broker",
            Self::SocialMedia => "social_media",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Self::Auth),
            "analytics" => Ok(Self::Analytics),
            "ai_llm" => Ok(Self::AiLlm),
            "broker" => Ok(Self::Broker),
            "social_media" => Ok(Self::SocialMedia),
            _ => Err(format!("Unknown connection category: {}", s)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in provider tags understood by the default client factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Embedded file-based relational store (SQLite)
    FileRelational,
    /// Embedded columnar analytical store (DuckDB)
    ColumnarAnalytics,
    /// Networked relational store (PostgreSQL)
    NetworkedRelational,
    /// Remote HTTP API with bearer auth
    HttpApi,
}

impl ProviderKind {
    /// Every built-in provider
    pub const ALL: [ProviderKind; 4] =
        [Self::FileRelational, Self::ColumnarAnalytics, Self::NetworkedRelational, Self::HttpApi];

    /// Get the tag stored on connection records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRelational => "file-relational",
            Self::ColumnarAnalytics => "columnar-analytics",
            Self::NetworkedRelational => "networked-relational",
            Self::HttpApi => "http-api",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file-relational" => Ok(Self::FileRelational),
            "columnar-analytics" => Ok(Self::ColumnarAnalytics),
            "networked-relational" => Ok(Self::NetworkedRelational),
            "http-api" => Ok(Self::HttpApi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment a record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Prod,
    Sandbox,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Sandbox => "sandbox",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Self::Prod),
            "sandbox" => Ok(Self::Sandbox),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown connection status: {}", s)),
        }
    }
}

/// Observed connection health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionHealth {
    Healthy,
    Degraded,
    #[default]
    Down,
}

impl ConnectionHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

impl FromStr for ConnectionHealth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "down" => Ok(Self::Down),
            _ => Err(format!("Unknown connection health: {}", s)),
        }
    }
}

/// A persisted connection definition.
///
/// Rows are owned by an external admin workflow; the registry only reads them
/// and writes back the observed `status`/`health`/timestamps. Those observed
/// fields are advisory and never stop the registry from trying to connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "connection_type")]
    pub category: Category,
    pub provider: String,
    /// Ciphertext produced by `CredentialCodec::encrypt`
    #[serde(skip_serializing)]
    pub credentials: String,
    pub environment: Environment,
    pub is_enabled: bool,
    pub status: ConnectionStatus,
    pub health: ConnectionHealth,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    /// Build a fresh, enabled, never-checked record
    pub fn new(
        id: i64,
        name: impl Into<String>,
        category: Category,
        provider: impl Into<String>,
        credentials: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            provider: provider.into(),
            credentials: credentials.into(),
            environment: Environment::default(),
            is_enabled: true,
            status: ConnectionStatus::default(),
            health: ConnectionHealth::default(),
            last_checked_at: None,
            last_success_at: None,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }

    /// Apply an observation written back by the registry
    pub fn apply(&mut self, observation: &HealthObservation) {
        self.status = observation.status;
        self.health = observation.health;
        self.last_checked_at = Some(observation.checked_at);
        if observation.succeeded_at.is_some() {
            self.last_success_at = observation.succeeded_at;
        }
    }
}

/// Telemetry the registry records after a switch or health check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthObservation {
    pub status: ConnectionStatus,
    pub health: ConnectionHealth,
    pub checked_at: DateTime<Utc>,
    /// Set only when the probe succeeded
    pub succeeded_at: Option<DateTime<Utc>>,
}

impl HealthObservation {
    /// The backend answered its probe
    pub fn healthy() -> Self {
        let now = Utc::now();
        Self {
            status: ConnectionStatus::Connected,
            health: ConnectionHealth::Healthy,
            checked_at: now,
            succeeded_at: Some(now),
        }
    }

    /// Resources are held but the probe failed
    pub fn degraded() -> Self {
        Self {
            status: ConnectionStatus::Connected,
            health: ConnectionHealth::Degraded,
            checked_at: Utc::now(),
            succeeded_at: None,
        }
    }

    /// The backend could not be reached at all
    pub fn down() -> Self {
        Self {
            status: ConnectionStatus::Error,
            health: ConnectionHealth::Down,
            checked_at: Utc::now(),
            succeeded_at: None,
        }
    }

    /// Resources were released on purpose
    pub fn released() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            health: ConnectionHealth::Down,
            checked_at: Utc::now(),
            succeeded_at: None,
        }
    }
}
