//! Backend client trait and the types it exchanges.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Sqlite};
use std::fmt;
use std::time::Duration;

/// Uniform lifecycle over any backend kind.
///
/// Lifecycle methods (`connect`, `disconnect`, `test_connection`,
/// `health_check`) never fail: they log the cause and report through their
/// return value. Data access (`get_session`, `execute_query`) propagates errors.
///
/// `target` names a logical sub-database on multi-store variants; `None`
/// selects the default store. Single-target variants reject named targets.
#[async_trait]
pub trait BackendClient: Send + Sync + fmt::Debug {
    /// Provider tag this client was built for
    fn provider(&self) -> &str;

    /// Name of the connection record this client was built from
    fn name(&self) -> &str;

    /// Establish underlying resources. Idempotent.
    async fn connect(&self) -> bool;

    /// Release underlying resources. Idempotent; safe when never connected.
    async fn disconnect(&self) -> bool;

    /// Whether resources are currently held
    async fn is_connected(&self) -> bool;

    /// Connect if needed and run a trivial liveness probe
    async fn test_connection(&self) -> bool;

    /// Per-request handle; connects first if needed. Dropping it releases it.
    async fn get_session(&self, target: Option<&str>) -> Result<BackendSession>;

    /// Run a backend-native operation. Writes commit on success and roll back on failure.
    async fn execute_query(&self, target: Option<&str>, query: &str, params: &[Value]) -> Result<QueryResult>;

    /// Structured, non-failing health summary
    async fn health_check(&self) -> HealthReport;
}

/// A scoped, backend-specific handle for issuing operations
pub enum BackendSession {
    /// Pooled connection to one embedded relational store
    FileRelational(PoolConnection<Sqlite>),
    /// Dedicated connection to one embedded analytical store
    ColumnarAnalytics(duckdb::Connection),
    /// Pooled connection to the networked relational store
    NetworkedRelational(PoolConnection<Postgres>),
    /// Configured HTTP client
    HttpApi(HttpSession),
}

impl BackendSession {
    /// Provider tag of the backend this session belongs to
    pub fn provider(&self) -> &'static str {
        match self {
            Self::FileRelational(_) => "file-relational",
            Self::ColumnarAnalytics(_) => "columnar-analytics",
            Self::NetworkedRelational(_) => "networked-relational",
            Self::HttpApi(_) => "http-api",
        }
    }
}

impl fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpApi(session) => f.debug_tuple("HttpApi").field(session).finish(),
            other => f.debug_tuple("BackendSession").field(&other.provider()).finish(),
        }
    }
}

/// HTTP client bound to one API: base URL, merged headers, per-request timeout
#[derive(Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    base_url: url::Url,
    timeout: Duration,
}

impl HttpSession {
    pub(crate) fn new(client: reqwest::Client, base_url: url::Url, timeout: Duration) -> Self {
        Self { client, base_url, timeout }
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `path` against the base URL, keeping any base path prefix
    pub fn url(&self, path: &str) -> Result<url::Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = if path.is_empty() { base.to_string() } else { format!("{}/{}", base, path) };
        url::Url::parse(&joined).map_err(|e| {
            crate::errors::BackplaneError::validation_field(format!("Invalid request path '{}': {}", path, e), "query")
        })
    }

    /// Start a request; the session timeout is applied to this request only
    pub fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.client.request(method, self.url(path)?).timeout(self.timeout))
    }

    pub fn get(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::GET, path)
    }
}

impl fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSession")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Rows returned by a backend operation, decoded to JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, in order, when the backend reports them
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    /// Rows changed by a write; zero for reads
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn affected(rows_affected: u64) -> Self {
        Self { rows_affected, ..Default::default() }
    }

    /// First value of the first row, if any
    pub fn scalar(&self) -> Option<&Value> {
        let row = self.rows.first()?;
        match self.columns.first() {
            Some(column) => row.get(column),
            None => row.values().next(),
        }
    }
}

/// Outcome of a health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
}

/// Structured health summary: `{"type", "connected", "status", ...details}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(rename = "type")]
    pub provider: String,
    pub connected: bool,
    pub status: ProbeStatus,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl HealthReport {
    pub fn new(provider: impl Into<String>, connected: bool, healthy: bool) -> Self {
        Self {
            provider: provider.into(),
            connected,
            status: if healthy { ProbeStatus::Healthy } else { ProbeStatus::Unhealthy },
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }

    /// JSON object form, as exposed to monitoring
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Statements that produce rows and run outside a transaction
pub(crate) fn is_read_statement(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .trim_start_matches('(')
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "PRAGMA" | "SHOW" | "DESCRIBE" | "EXPLAIN" | "VALUES" | "SUMMARIZE" | "TABLE"
    )
}

/// Writes that hand rows back through `RETURNING`
pub(crate) fn has_returning_clause(sql: &str) -> bool {
    sql.to_ascii_uppercase().split_whitespace().any(|word| word == "RETURNING")
}

/// Named target on a single-target backend
pub(crate) fn reject_named_target(provider: &str, target: Option<&str>) -> Result<()> {
    match target {
        Some(name) => Err(crate::errors::BackplaneError::validation_field(
            format!("{} has a single target; '{}' is not addressable", provider, name),
            "target",
        )),
        None => Ok(()),
    }
}
