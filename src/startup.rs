//! Startup context for a process that serves categories through the registry
//!
//! Wires the record store, credential codec and client factory into one
//! [`ConnectionRegistry`], activates the configured connections, and runs
//! the periodic health checks until asked to stop.

use crate::backends::ClientFactory;
use crate::config::AppConfig;
use crate::domain::Category;
use crate::errors::Result;
use crate::registry::{ConnectionRegistry, ConnectionRouter};
use crate::secrets::CredentialCodec;
use crate::storage::{create_pool, ConnectionRepository, ConnectionStore, DbPool, PoolStats};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a running process holds on to
#[derive(Debug, Clone)]
pub struct Backplane {
    pool: DbPool,
    repository: ConnectionRepository,
    registry: Arc<ConnectionRegistry>,
    router: ConnectionRouter,
}

impl Backplane {
    /// Open the record store and build the registry. Nothing is activated yet.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = create_pool(&config.store).await?;
        let repository = ConnectionRepository::new(pool.clone());
        repository.ensure_schema().await?;

        let codec = Arc::new(CredentialCodec::new(&config.credentials)?);
        let factory = ClientFactory::builtin(config.backends.clone());
        let store: Arc<dyn ConnectionStore> = Arc::new(repository.clone());
        let registry = Arc::new(ConnectionRegistry::new(store, codec, factory));
        let router = ConnectionRouter::new(Arc::clone(&registry));

        info!(
            key_version = %config.credentials.key_version,
            providers = ?registry.factory().providers(),
            "Connection registry ready"
        );

        Ok(Self { pool, repository, registry, router })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn repository(&self) -> &ConnectionRepository {
        &self.repository
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    /// Activate the connections selected by `BACKPLANE_ACTIVE_*`
    pub async fn activate(&self, config: &AppConfig) -> BTreeMap<Category, bool> {
        let outcomes = self.registry.activate_configured(&config.bootstrap).await;
        for (category, activated) in &outcomes {
            if !activated {
                warn!(category = %category, "Configured connection was not activated");
            }
        }
        outcomes
    }

    /// Router health report plus the record store's pool, under `record_store`
    pub async fn health_report(&self) -> Value {
        let mut report = self.router.health_report().await;
        let stats = PoolStats::of(&self.pool);
        if let Some(object) = report.as_object_mut() {
            object.insert(
                "record_store".to_string(),
                json!({
                    "size": stats.size,
                    "idle": stats.idle,
                    "active": stats.active(),
                    "healthy": stats.is_healthy() && !self.pool.is_closed(),
                }),
            );
        }
        report
    }

    /// Check every active category at `interval` until `shutdown` resolves
    pub async fn run_health_checks<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let reports = self.registry.check_all().await;
                    let unhealthy = reports.values().filter(|r| !r.is_healthy()).count();
                    info!(checked = reports.len(), unhealthy, "Periodic health check completed");
                }
            }
        }
    }

    /// Release every active client and close the record store
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.pool.close().await;
    }
}
