//! # Storage and Persistence
//!
//! Access to the connection records the registry switches between. The
//! records live in a SQLite database owned by an external admin workflow;
//! [`InMemoryConnectionStore`] stands in for it when embedding or testing.

pub mod pool;
pub mod repositories;
pub mod store;

pub use crate::config::DatabaseConfig;

pub use pool::{create_pool, DbPool, PoolStats};
pub use repositories::{ConnectionRepository, CreateConnectionRequest};
pub use store::{ConnectionStore, InMemoryConnectionStore};

use crate::errors::{BackplaneError, Result};

/// Check record store connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| BackplaneError::Database {
        source: e,
        context: "Record store connectivity check failed".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_connection() {
        let config = DatabaseConfig { url: "sqlite::memory:".to_string(), ..Default::default() };
        let pool = create_pool(&config).await.unwrap();
        check_connection(&pool).await.unwrap();
    }
}
