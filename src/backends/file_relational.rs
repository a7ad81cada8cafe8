//! Embedded file-based relational backend (SQLite).
//!
//! Each logical store name maps to its own database file and its own pool.
//! Parent directories are created before a file is opened.

use super::client::{
    has_returning_clause, is_read_statement, BackendClient, BackendSession, HealthReport, QueryResult,
};
use super::rows::{bind_sqlite, column_names, sqlite_row_to_json};
use crate::config::BackendSettings;
use crate::domain::ProviderKind;
use crate::errors::{BackplaneError, Result};
use crate::secrets::StorePaths;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn, Instrument};

const PROVIDER: &str = "file-relational";
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite-backed client over one or more named database files
#[derive(Debug)]
pub struct FileRelationalClient {
    name: String,
    stores: StorePaths,
    max_connections: u32,
    busy_timeout: Duration,
    pools: RwLock<Option<BTreeMap<String, SqlitePool>>>,
}

impl FileRelationalClient {
    pub fn new(name: impl Into<String>, stores: StorePaths, settings: &BackendSettings) -> Self {
        Self {
            name: name.into(),
            stores,
            max_connections: settings.sqlite_max_connections,
            busy_timeout: settings.sqlite_busy_timeout(),
            pools: RwLock::new(None),
        }
    }

    /// Build from a decrypted envelope
    pub fn from_credentials(name: &str, payload: &Value, settings: &BackendSettings) -> Result<Self> {
        let stores = StorePaths::from_payload(ProviderKind::FileRelational, payload)?.ok_or_else(|| {
            BackplaneError::malformed_for(PROVIDER, "at least one store path is required")
        })?;
        Ok(Self::new(name, stores, settings))
    }

    pub fn stores(&self) -> &StorePaths {
        &self.stores
    }

    async fn open_pool(&self, path: &Path) -> Result<SqlitePool> {
        let in_memory = path.as_os_str() == ":memory:";

        let (options, pool_options) = if in_memory {
            // Every connection to :memory: is a separate database, so pin one.
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
            let pool_options = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (options, pool_options)
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| BackplaneError::Io {
                    source: e,
                    context: format!("Failed to create directory '{}'", parent.display()),
                })?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .busy_timeout(self.busy_timeout)
                .journal_mode(SqliteJournalMode::Wal);
            (options, SqlitePoolOptions::new().max_connections(self.max_connections))
        };

        let pool = pool_options
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connect().await {
            Ok(())
        } else {
            Err(BackplaneError::connectivity(PROVIDER, format!("'{}' is not connected", self.name)))
        }
    }

    async fn pool_for(&self, target: Option<&str>) -> Result<(String, SqlitePool)> {
        let (store, _) = self.stores.resolve(target)?;
        let store = store.to_string();
        self.ensure_connected().await?;
        let pools = self.pools.read().await;
        let pool = pools
            .as_ref()
            .and_then(|p| p.get(&store))
            .cloned()
            .ok_or_else(|| BackplaneError::connectivity(PROVIDER, format!("store '{}' was released", store)))?;
        Ok((store, pool))
    }

    async fn run(&self, pool: &SqlitePool, query: &str, params: &[Value]) -> std::result::Result<QueryResult, sqlx::Error> {
        if is_read_statement(query) {
            let rows = bind_sqlite(sqlx::query(query), params).fetch_all(pool).await?;
            return Ok(QueryResult {
                columns: rows.first().map(column_names).unwrap_or_default(),
                rows: rows.iter().map(sqlite_row_to_json).collect(),
                rows_affected: 0,
            });
        }

        let mut tx = pool.begin().await?;
        let outcome = if has_returning_clause(query) {
            bind_sqlite(sqlx::query(query), params).fetch_all(&mut *tx).await.map(|rows| QueryResult {
                columns: rows.first().map(column_names).unwrap_or_default(),
                rows_affected: rows.len() as u64,
                rows: rows.iter().map(sqlite_row_to_json).collect(),
            })
        } else {
            bind_sqlite(sqlx::query(query), params)
                .execute(&mut *tx)
                .await
                .map(|done| QueryResult::affected(done.rows_affected()))
        };

        match outcome {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl BackendClient for FileRelationalClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> bool {
        if self.pools.read().await.is_some() {
            return true;
        }

        let mut guard = self.pools.write().await;
        if guard.is_some() {
            return true;
        }

        let mut opened = BTreeMap::new();
        for (store, path) in self.stores.iter() {
            match self.open_pool(path).await {
                Ok(pool) => {
                    debug!(connection = %self.name, store = %store, path = %path.display(), "Opened SQLite store");
                    opened.insert(store.to_string(), pool);
                }
                Err(e) => {
                    warn!(
                        provider = PROVIDER,
                        connection = %self.name,
                        store = %store,
                        path = %path.display(),
                        error = %e,
                        "Failed to open SQLite store"
                    );
                    for pool in opened.values() {
                        pool.close().await;
                    }
                    return false;
                }
            }
        }

        info!(provider = PROVIDER, connection = %self.name, stores = opened.len(), "Connected");
        *guard = Some(opened);
        true
    }

    async fn disconnect(&self) -> bool {
        let pools = self.pools.write().await.take();
        if let Some(pools) = pools {
            for pool in pools.values() {
                pool.close().await;
            }
            info!(provider = PROVIDER, connection = %self.name, "Disconnected");
        }
        true
    }

    async fn is_connected(&self) -> bool {
        self.pools.read().await.is_some()
    }

    async fn test_connection(&self) -> bool {
        if !self.connect().await {
            return false;
        }
        let pools: Vec<(String, SqlitePool)> = match self.pools.read().await.as_ref() {
            Some(pools) => pools.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => return false,
        };
        for (store, pool) in pools {
            if let Err(e) = sqlx::query("SELECT 1").fetch_one(&pool).await {
                warn!(provider = PROVIDER, connection = %self.name, store = %store, error = %e, "Liveness probe failed");
                return false;
            }
        }
        true
    }

    async fn get_session(&self, target: Option<&str>) -> Result<BackendSession> {
        let (store, pool) = self.pool_for(target).await?;
        let connection = pool.acquire().await.map_err(|e| {
            BackplaneError::connectivity(PROVIDER, format!("store '{}': {}", store, e))
        })?;
        Ok(BackendSession::FileRelational(connection))
    }

    async fn execute_query(&self, target: Option<&str>, query: &str, params: &[Value]) -> Result<QueryResult> {
        let (store, pool) = self.pool_for(target).await?;
        self.run(&pool, query, params)
            .instrument(crate::backend_span!("execute_query", PROVIDER, store))
            .await
            .map_err(|e| BackplaneError::query(PROVIDER, e.to_string()))
    }

    async fn health_check(&self) -> HealthReport {
        let healthy = self.test_connection().await;
        let connected = self.is_connected().await;

        let stores: Map<String, Value> =
            self.stores.iter().map(|(name, path)| (name.to_string(), json!(path.display().to_string()))).collect();
        let mut pools = Map::new();
        if let Some(open) = self.pools.read().await.as_ref() {
            for (store, pool) in open {
                pools.insert(store.clone(), json!({"size": pool.size(), "idle": pool.num_idle()}));
            }
        }

        HealthReport::new(PROVIDER, connected, healthy)
            .with_detail("stores", stores)
            .with_detail("default_store", self.stores.default_store())
            .with_detail("pools", pools)
    }
}
