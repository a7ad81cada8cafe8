//! Connection record repository
//!
//! Reads the `connections` table and writes back the status/health telemetry
//! observed by the registry. Credential ciphertext is passed through untouched.

use crate::domain::{
    Category, ConnectionHealth, ConnectionRecord, ConnectionStatus, Environment, HealthObservation,
};
use crate::errors::{BackplaneError, Result};
use crate::storage::{ConnectionStore, DbPool};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::instrument;

const SELECT_COLUMNS: &str = "SELECT id, name, connection_type, provider, credentials, environment, is_enabled, \
     status, health, last_checked_at, last_success_at FROM connections";

/// Database row structure for connections
#[derive(Debug, Clone, FromRow)]
struct ConnectionRow {
    pub id: i64,
    pub name: String,
    pub connection_type: String,
    pub provider: String,
    pub credentials: String,
    pub environment: String,
    pub is_enabled: bool,
    pub status: String,
    pub health: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConnectionRow> for ConnectionRecord {
    type Error = BackplaneError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let invalid = |column: &str, message: String| {
            BackplaneError::validation_field(format!("connection {}: {}", row.id, message), column)
        };

        Ok(Self {
            id: row.id,
            category: row.connection_type.parse::<Category>().map_err(|e| invalid("connection_type", e))?,
            environment: row.environment.parse::<Environment>().map_err(|e| invalid("environment", e))?,
            status: row.status.parse::<ConnectionStatus>().map_err(|e| invalid("status", e))?,
            health: row.health.parse::<ConnectionHealth>().map_err(|e| invalid("health", e))?,
            name: row.name,
            provider: row.provider,
            credentials: row.credentials,
            is_enabled: row.is_enabled,
            last_checked_at: row.last_checked_at,
            last_success_at: row.last_success_at,
        })
    }
}

/// Create connection request, used by seeding and administrative tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConnectionRequest {
    pub name: String,
    pub category: Category,
    pub provider: String,
    /// Ciphertext produced by `CredentialCodec::encrypt`
    pub credentials: String,
    pub environment: Environment,
    pub is_enabled: bool,
}

/// Repository for connection record access
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pool: DbPool,
}

impl ConnectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the database pool reference
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Create the `connections` table when it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                connection_type TEXT NOT NULL,
                provider TEXT NOT NULL,
                credentials TEXT NOT NULL,
                environment TEXT NOT NULL DEFAULT 'prod',
                is_enabled BOOLEAN NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'disconnected',
                health TEXT NOT NULL DEFAULT 'down',
                last_checked_at TEXT,
                last_success_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BackplaneError::Database {
            source: e,
            context: "Failed to create connections table".to_string(),
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_type ON connections (connection_type)")
            .execute(&self.pool)
            .await
            .map_err(|e| BackplaneError::Database {
                source: e,
                context: "Failed to create connections index".to_string(),
            })?;

        Ok(())
    }

    /// Insert a new record. Names are unique; a duplicate yields `Conflict`.
    #[instrument(skip(self, request), fields(connection_name = %request.name, category = %request.category), name = "db_create_connection")]
    pub async fn create(&self, request: CreateConnectionRequest) -> Result<ConnectionRecord> {
        let result = sqlx::query(
            "INSERT INTO connections (name, connection_type, provider, credentials, environment, is_enabled) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.name)
        .bind(request.category.as_str())
        .bind(&request.provider)
        .bind(&request.credentials)
        .bind(request.environment.as_str())
        .bind(request.is_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db_err| db_err.is_unique_violation()) {
                tracing::warn!(connection_name = %request.name, "Connection name already in use");
                return BackplaneError::conflict(format!("a connection named '{}' already exists", request.name));
            }
            tracing::error!(error = %e, connection_name = %request.name, "Failed to create connection");
            BackplaneError::Database {
                source: e,
                context: format!("Failed to create connection '{}'", request.name),
            }
        })?;

        let id = result.last_insert_rowid();
        tracing::info!(
            connection_id = id,
            connection_name = %request.name,
            category = %request.category,
            provider = %request.provider,
            "Created connection record"
        );

        self.get_by_id(id).await
    }

    /// Get a record by id, failing when absent
    #[instrument(skip(self), name = "db_get_connection_by_id")]
    pub async fn get_by_id(&self, id: i64) -> Result<ConnectionRecord> {
        self.find(id).await?.ok_or_else(|| BackplaneError::not_found("Connection", id.to_string()))
    }

    async fn find(&self, id: i64) -> Result<Option<ConnectionRecord>> {
        let row = sqlx::query_as::<sqlx::Sqlite, ConnectionRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, connection_id = id, "Failed to get connection by ID");
                BackplaneError::Database { source: e, context: format!("Failed to get connection with ID '{}'", id) }
            })?;

        row.map(ConnectionRecord::try_from).transpose()
    }

    /// Every record, ordered by id
    #[instrument(skip(self), name = "db_list_connections")]
    pub async fn list(&self) -> Result<Vec<ConnectionRecord>> {
        let rows = sqlx::query_as::<sqlx::Sqlite, ConnectionRow>(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BackplaneError::Database { source: e, context: "Failed to list connections".to_string() })?;

        rows.into_iter().map(ConnectionRecord::try_from).collect()
    }
}

#[async_trait]
impl ConnectionStore for ConnectionRepository {
    async fn get(&self, id: i64) -> Result<Option<ConnectionRecord>> {
        self.find(id).await
    }

    #[instrument(skip(self), fields(category = %category), name = "db_list_connections_by_category")]
    async fn list_by_category(&self, category: Category) -> Result<Vec<ConnectionRecord>> {
        let rows = sqlx::query_as::<sqlx::Sqlite, ConnectionRow>(&format!(
            "{} WHERE connection_type = ? ORDER BY id",
            SELECT_COLUMNS
        ))
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BackplaneError::Database {
            source: e,
            context: format!("Failed to list '{}' connections", category),
        })?;

        rows.into_iter().map(ConnectionRecord::try_from).collect()
    }

    #[instrument(skip(self, observation), fields(status = %observation.status.as_str()), name = "db_record_observation")]
    async fn record_observation(&self, id: i64, observation: &HealthObservation) -> Result<()> {
        sqlx::query(
            "UPDATE connections SET status = ?, health = ?, last_checked_at = ?, \
             last_success_at = COALESCE(?, last_success_at) WHERE id = ?",
        )
        .bind(observation.status.as_str())
        .bind(observation.health.as_str())
        .bind(observation.checked_at)
        .bind(observation.succeeded_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| BackplaneError::Database {
            source: e,
            context: format!("Failed to record observation for connection '{}'", id),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::create_pool;

    async fn repository() -> ConnectionRepository {
        let pool = create_pool(&DatabaseConfig { url: "sqlite::memory:".to_string(), ..Default::default() })
            .await
            .unwrap();
        let repository = ConnectionRepository::new(pool);
        repository.ensure_schema().await.unwrap();
        repository
    }

    fn request(name: &str, category: Category) -> CreateConnectionRequest {
        CreateConnectionRequest {
            name: name.to_string(),
            category,
            provider: "http-api".to_string(),
            credentials: "ciphertext".to_string(),
            environment: Environment::Sandbox,
            is_enabled: true,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repository = repository().await;
        let created = repository.create(request("paper", Category::Broker)).await.unwrap();

        assert_eq!(created.category, Category::Broker);
        assert_eq!(created.environment, Environment::Sandbox);
        assert_eq!(created.status, ConnectionStatus::Disconnected);
        assert_eq!(created.health, ConnectionHealth::Down);
        assert_eq!(created.credentials, "ciphertext");

        assert!(repository.get(created.id).await.unwrap().is_some());
        assert!(repository.get(created.id + 100).await.unwrap().is_none());
        assert!(matches!(repository.get_by_id(999).await, Err(BackplaneError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_a_conflict() {
        let repository = repository().await;
        repository.create(request("paper", Category::Broker)).await.unwrap();

        let err = repository.create(request("paper", Category::AiLlm)).await.unwrap_err();
        assert!(matches!(err, BackplaneError::Conflict { .. }));
        assert!(err.to_string().contains("paper"));
        assert_eq!(repository.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_category() {
        let repository = repository().await;
        repository.create(request("paper", Category::Broker)).await.unwrap();
        repository.create(request("openai", Category::AiLlm)).await.unwrap();
        repository.create(request("live", Category::Broker)).await.unwrap();

        let brokers = repository.list_by_category(Category::Broker).await.unwrap();
        assert_eq!(brokers.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["paper", "live"]);
        assert_eq!(repository.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_record_observation_round_trip() {
        let repository = repository().await;
        let id = repository.create(request("paper", Category::Broker)).await.unwrap().id;

        repository.record_observation(id, &HealthObservation::healthy()).await.unwrap();
        let healthy = repository.get_by_id(id).await.unwrap();
        assert_eq!(healthy.status, ConnectionStatus::Connected);
        assert_eq!(healthy.health, ConnectionHealth::Healthy);
        assert!(healthy.last_success_at.is_some());

        repository.record_observation(id, &HealthObservation::down()).await.unwrap();
        let down = repository.get_by_id(id).await.unwrap();
        assert_eq!(down.status, ConnectionStatus::Error);
        assert_eq!(down.last_success_at, healthy.last_success_at);
        assert!(down.last_checked_at >= healthy.last_checked_at);
    }

    #[tokio::test]
    async fn test_unknown_category_in_row_is_rejected() {
        let repository = repository().await;
        sqlx::query("INSERT INTO connections (name, connection_type, provider, credentials) VALUES ('x', 'mainframe', 'http-api', 'c')")
            .execute(repository.pool())
            .await
            .unwrap();

        let err = repository.list().await.unwrap_err();
        assert!(matches!(err, BackplaneError::Validation { .. }));
    }
}
