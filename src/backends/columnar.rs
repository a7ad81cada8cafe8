//! Embedded columnar analytics backend (DuckDB).
//!
//! DuckDB's API is synchronous, so every call runs on the blocking pool. Each
//! store keeps one shared connection; sessions are independent clones of it.

use super::client::{
    has_returning_clause, is_read_statement, BackendClient, BackendSession, HealthReport, QueryResult,
};
use super::rows::{duck_param, duck_value_to_json};
use crate::config::BackendSettings;
use crate::domain::ProviderKind;
use crate::errors::{BackplaneError, Result};
use crate::secrets::StorePaths;
use async_trait::async_trait;
use duckdb::{params_from_iter, Config, Connection};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn, Instrument};

const PROVIDER: &str = "columnar-analytics";

/// Store names opened under the analytics data directory when a record
/// carries no paths of its own
pub const DEFAULT_ANALYTICS_STORES: [&str; 3] = ["analytics", "market_data", "screener"];

type SharedConnection = Arc<Mutex<Connection>>;

/// DuckDB-backed client over one or more named database files
#[derive(Debug)]
pub struct ColumnarAnalyticsClient {
    name: String,
    stores: StorePaths,
    connections: RwLock<Option<BTreeMap<String, SharedConnection>>>,
}

impl ColumnarAnalyticsClient {
    pub fn new(name: impl Into<String>, stores: StorePaths) -> Self {
        Self { name: name.into(), stores, connections: RwLock::new(None) }
    }

    /// Build from a decrypted envelope. An empty envelope opens the default
    /// analytics stores under the configured data directory.
    pub fn from_credentials(name: &str, payload: &Value, settings: &BackendSettings) -> Result<Self> {
        let stores = match StorePaths::from_payload(ProviderKind::ColumnarAnalytics, payload)? {
            Some(stores) => stores,
            None => StorePaths::under_directory(&settings.analytics_data_dir, &DEFAULT_ANALYTICS_STORES, "duckdb"),
        };
        Ok(Self::new(name, stores))
    }

    pub fn stores(&self) -> &StorePaths {
        &self.stores
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connect().await {
            Ok(())
        } else {
            Err(BackplaneError::connectivity(PROVIDER, format!("'{}' is not connected", self.name)))
        }
    }

    async fn connection_for(&self, target: Option<&str>) -> Result<(String, SharedConnection)> {
        let (store, _) = self.stores.resolve(target)?;
        let store = store.to_string();
        self.ensure_connected().await?;
        let connections = self.connections.read().await;
        let connection = connections
            .as_ref()
            .and_then(|c| c.get(&store))
            .cloned()
            .ok_or_else(|| BackplaneError::connectivity(PROVIDER, format!("store '{}' was released", store)))?;
        Ok((store, connection))
    }

    fn snapshot(connections: &Option<BTreeMap<String, SharedConnection>>) -> Vec<(String, SharedConnection)> {
        connections
            .as_ref()
            .map(|c| c.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect())
            .unwrap_or_default()
    }
}

fn open_store(path: &Path) -> Result<Connection> {
    let config = Config::default()
        .allow_unsigned_extensions()
        .map_err(|e| BackplaneError::connectivity(PROVIDER, e.to_string()))?;

    if path.as_os_str() == ":memory:" {
        return Connection::open_in_memory_with_flags(config)
            .map_err(|e| BackplaneError::connectivity(PROVIDER, e.to_string()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BackplaneError::Io {
            source: e,
            context: format!("Failed to create directory '{}'", parent.display()),
        })?;
    }
    Connection::open_with_flags(path, config)
        .map_err(|e| BackplaneError::connectivity(PROVIDER, format!("{}: {}", path.display(), e)))
}

/// Run `work` against a shared connection on the blocking pool
async fn with_connection<T, F>(connection: SharedConnection, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = connection
            .lock()
            .map_err(|_| BackplaneError::internal("DuckDB connection lock poisoned"))?;
        work(&mut guard)
    })
    .await
    .map_err(|e| BackplaneError::internal(format!("DuckDB task failed: {}", e)))?
}

fn read_rows(conn: &Connection, query: &str, params: &[Value]) -> duckdb::Result<QueryResult> {
    let mut statement = conn.prepare(query)?;
    let mut rows = statement.query(params_from_iter(params.iter().map(duck_param)))?;
    let columns: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

    let mut decoded = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let value: duckdb::types::Value = row.get(index)?;
            object.insert(column.clone(), duck_value_to_json(value));
        }
        decoded.push(object);
    }

    Ok(QueryResult { columns, rows: decoded, rows_affected: 0 })
}

fn run_statement(conn: &mut Connection, query: &str, params: &[Value]) -> duckdb::Result<QueryResult> {
    if is_read_statement(query) {
        return read_rows(conn, query, params);
    }

    // Dropping an uncommitted transaction rolls it back.
    let tx = conn.transaction()?;
    let result = if has_returning_clause(query) {
        let mut result = read_rows(&tx, query, params)?;
        result.rows_affected = result.rows.len() as u64;
        result
    } else {
        let changed = tx.execute(query, params_from_iter(params.iter().map(duck_param)))?;
        QueryResult::affected(changed as u64)
    };
    tx.commit()?;
    Ok(result)
}

#[async_trait]
impl BackendClient for ColumnarAnalyticsClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> bool {
        if self.connections.read().await.is_some() {
            return true;
        }

        let mut guard = self.connections.write().await;
        if guard.is_some() {
            return true;
        }

        let stores: Vec<(String, PathBuf)> =
            self.stores.iter().map(|(name, path)| (name.to_string(), path.to_path_buf())).collect();
        let opened = tokio::task::spawn_blocking(move || {
            let mut opened = BTreeMap::new();
            for (store, path) in stores {
                let connection = open_store(&path).map_err(|e| (store.clone(), path.clone(), e))?;
                opened.insert(store, Arc::new(Mutex::new(connection)));
            }
            Ok::<_, (String, PathBuf, BackplaneError)>(opened)
        })
        .await;

        match opened {
            Ok(Ok(opened)) => {
                info!(provider = PROVIDER, connection = %self.name, stores = opened.len(), "Connected");
                *guard = Some(opened);
                true
            }
            Ok(Err((store, path, e))) => {
                warn!(
                    provider = PROVIDER,
                    connection = %self.name,
                    store = %store,
                    path = %path.display(),
                    error = %e,
                    "Failed to open DuckDB store"
                );
                false
            }
            Err(e) => {
                warn!(provider = PROVIDER, connection = %self.name, error = %e, "DuckDB open task failed");
                false
            }
        }
    }

    async fn disconnect(&self) -> bool {
        if self.connections.write().await.take().is_some() {
            info!(provider = PROVIDER, connection = %self.name, "Disconnected");
        }
        true
    }

    async fn is_connected(&self) -> bool {
        self.connections.read().await.is_some()
    }

    async fn test_connection(&self) -> bool {
        if !self.connect().await {
            return false;
        }
        let connections = Self::snapshot(&*self.connections.read().await);
        for (store, connection) in connections {
            let probe = with_connection(connection, |conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                    .map_err(|e| BackplaneError::connectivity(PROVIDER, e.to_string()))
            })
            .await;
            if let Err(e) = probe {
                warn!(provider = PROVIDER, connection = %self.name, store = %store, error = %e, "Liveness probe failed");
                return false;
            }
        }
        true
    }

    async fn get_session(&self, target: Option<&str>) -> Result<BackendSession> {
        let (store, connection) = self.connection_for(target).await?;
        debug!(connection = %self.name, store = %store, "Opening DuckDB session");
        let session = with_connection(connection, move |conn| {
            conn.try_clone()
                .map_err(|e| BackplaneError::connectivity(PROVIDER, format!("store '{}': {}", store, e)))
        })
        .await?;
        Ok(BackendSession::ColumnarAnalytics(session))
    }

    async fn execute_query(&self, target: Option<&str>, query: &str, params: &[Value]) -> Result<QueryResult> {
        let (store, connection) = self.connection_for(target).await?;
        let span = crate::backend_span!("execute_query", PROVIDER, store);
        let query = query.to_string();
        let params = params.to_vec();
        with_connection(connection, move |conn| {
            run_statement(conn, &query, &params).map_err(|e| BackplaneError::query(PROVIDER, e.to_string()))
        })
        .instrument(span)
        .await
    }

    async fn health_check(&self) -> HealthReport {
        let healthy = self.test_connection().await;
        let connected = self.is_connected().await;

        let stores: Map<String, Value> =
            self.stores.iter().map(|(name, path)| (name.to_string(), json!(path.display().to_string()))).collect();

        HealthReport::new(PROVIDER, connected, healthy)
            .with_detail("stores", stores)
            .with_detail("default_store", self.stores.default_store())
    }
}
