//! # Connection Registry
//!
//! Holds, per category, the client currently serving it and swaps it at
//! runtime. Connecting a replacement happens outside the lock; the lock is
//! held only for the pointer swap, so readers of the old client are never
//! blocked by a slow or failing connect.

use super::managed::ManagedClient;
use crate::backends::{BackendClient, ClientFactory, HealthReport};
use crate::config::BootstrapConfig;
use crate::connection_span;
use crate::domain::{Category, ConnectionRecord, Environment, HealthObservation};
use crate::errors::{BackplaneError, Result};
use crate::secrets::CredentialCodec;
use crate::storage::ConnectionStore;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn, Instrument};

/// Pause before the single retry of a configured activation
const ACTIVATION_RETRY_DELAY: Duration = Duration::from_millis(250);

/// The client serving a category, with the record it was built from.
///
/// `client` stops serving once the registry releases it, so a handle kept
/// past a switch cannot reopen resources behind the registry's back.
#[derive(Debug)]
pub struct ActiveConnection {
    pub record_id: i64,
    pub name: String,
    pub category: Category,
    pub provider: String,
    pub environment: Environment,
    pub activated_at: DateTime<Utc>,
    pub client: Arc<dyn BackendClient>,
    managed: Arc<ManagedClient>,
}

impl ActiveConnection {
    fn new(record: &ConnectionRecord, client: Arc<dyn BackendClient>) -> Self {
        let managed = Arc::new(ManagedClient::new(client));
        Self {
            record_id: record.id,
            name: record.name.clone(),
            category: record.category,
            provider: record.provider.clone(),
            environment: record.environment,
            activated_at: Utc::now(),
            client: Arc::clone(&managed) as Arc<dyn BackendClient>,
            managed,
        }
    }

    /// Whether the registry has released this connection
    pub fn is_released(&self) -> bool {
        self.managed.is_retired()
    }

    /// Metadata as JSON, without the client
    pub fn summary(&self) -> Value {
        json!({
            "connection_id": self.record_id,
            "name": self.name,
            "provider": self.provider,
            "environment": self.environment.as_str(),
            "activated_at": self.activated_at.to_rfc3339(),
        })
    }
}

/// Per-category state. `epoch` advances on every swap so a switch that
/// started before another one completed can tell it lost.
#[derive(Debug, Default)]
struct Slot {
    active: Option<Arc<ActiveConnection>>,
    epoch: u64,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
    codec: Arc<CredentialCodec>,
    factory: ClientFactory,
    slots: RwLock<HashMap<Category, Slot>>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn ConnectionStore>, codec: Arc<CredentialCodec>, factory: ClientFactory) -> Self {
        Self { store, codec, factory, slots: RwLock::new(HashMap::new()) }
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// The client serving `category`, or `None` if nothing was ever activated
    pub async fn get_client(&self, category: Category) -> Option<Arc<dyn BackendClient>> {
        self.active(category).await.map(|active| Arc::clone(&active.client))
    }

    /// Metadata and client of the active connection for `category`
    pub async fn active(&self, category: Category) -> Option<Arc<ActiveConnection>> {
        self.slots.read().await.get(&category).and_then(|slot| slot.active.clone())
    }

    /// Every active connection, ordered by category
    pub async fn active_connections(&self) -> Vec<Arc<ActiveConnection>> {
        let mut active: Vec<Arc<ActiveConnection>> =
            self.slots.read().await.values().filter_map(|slot| slot.active.clone()).collect();
        active.sort_by_key(|a| a.category);
        active
    }

    /// Activate record `connection_id` for `category`.
    ///
    /// Returns `false` and leaves the category untouched when the record is
    /// missing, disabled or of another category, when its credentials cannot
    /// be decrypted or parsed, when its provider is unknown, when the new
    /// client fails to connect, or when a concurrent switch won the swap.
    pub async fn switch_connection(&self, category: Category, connection_id: i64) -> bool {
        match self.try_switch_connection(category, connection_id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    category = %category,
                    connection_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Connection switch rejected"
                );
                false
            }
        }
    }

    /// [`switch_connection`](Self::switch_connection) with the failure cause
    pub async fn try_switch_connection(&self, category: Category, connection_id: i64) -> Result<Arc<ActiveConnection>> {
        let span = connection_span!("switch", category, connection_id);
        self.switch_inner(category, connection_id).instrument(span).await
    }

    async fn switch_inner(&self, category: Category, connection_id: i64) -> Result<Arc<ActiveConnection>> {
        let record = self
            .store
            .get(connection_id)
            .await?
            .ok_or_else(|| BackplaneError::not_found("Connection", connection_id.to_string()))?;

        if record.category != category {
            return Err(BackplaneError::validation_field(
                format!("connection {} serves '{}', not '{}'", record.id, record.category, category),
                "category",
            ));
        }
        if !record.is_enabled {
            return Err(BackplaneError::validation_field(
                format!("connection {} is disabled", record.id),
                "is_enabled",
            ));
        }

        if !self.factory.is_registered(&record.provider) {
            return Err(BackplaneError::unknown_provider(record.provider.clone()));
        }

        let epoch = self.slots.read().await.get(&category).map(|slot| slot.epoch).unwrap_or_default();

        let payload = self.codec.decrypt(&record.credentials)?;
        let client = self.factory.build(&record, payload)?;

        if !client.connect().await {
            client.disconnect().await;
            self.observe(record.id, HealthObservation::down()).await;
            return Err(BackplaneError::connectivity(
                record.provider.clone(),
                format!("connection {} ('{}') failed to connect", record.id, record.name),
            ));
        }

        let active = Arc::new(ActiveConnection::new(&record, client));

        let previous = {
            let mut slots = self.slots.write().await;
            let slot = slots.entry(category).or_default();
            if slot.epoch != epoch {
                None
            } else {
                slot.epoch += 1;
                Some(slot.active.replace(Arc::clone(&active)))
            }
        };

        let Some(previous) = previous else {
            active.managed.retire().await;
            return Err(BackplaneError::conflict(format!(
                "a concurrent switch of '{}' completed first; connection {} was released",
                category, record.id
            )));
        };

        info!(
            category = %category,
            connection_id = record.id,
            connection_name = %record.name,
            provider = %record.provider,
            environment = %record.environment.as_str(),
            "Connection activated"
        );
        self.observe(record.id, HealthObservation::healthy()).await;

        if let Some(previous) = previous {
            self.release(&previous).await;
        }

        Ok(active)
    }

    /// Retire and disconnect a superseded client; failures are logged, never returned
    async fn release(&self, previous: &ActiveConnection) {
        if previous.managed.retire().await {
            debug!(category = %previous.category, connection_id = previous.record_id, "Superseded client released");
        } else {
            warn!(
                category = %previous.category,
                connection_id = previous.record_id,
                provider = %previous.provider,
                "Superseded client did not disconnect cleanly"
            );
        }
        self.observe(previous.record_id, HealthObservation::released()).await;
    }

    async fn observe(&self, connection_id: i64, observation: HealthObservation) {
        if let Err(e) = self.store.record_observation(connection_id, &observation).await {
            warn!(connection_id, error = %e, "Failed to record connection observation");
        }
    }

    /// Health-check the active client of `category` and record the outcome
    #[instrument(skip(self), fields(category = %category), name = "registry_check_health")]
    pub async fn check_health(&self, category: Category) -> Option<HealthReport> {
        let active = self.active(category).await?;
        let report = active.client.health_check().await;

        let observation = if report.is_healthy() {
            HealthObservation::healthy()
        } else if report.connected {
            HealthObservation::degraded()
        } else {
            HealthObservation::down()
        };
        self.observe(active.record_id, observation).await;

        if !report.is_healthy() {
            warn!(
                category = %category,
                connection_id = active.record_id,
                provider = %active.provider,
                connected = report.connected,
                "Active connection unhealthy"
            );
        }
        Some(report)
    }

    /// Health-check every active category concurrently
    pub async fn check_all(&self) -> BTreeMap<Category, HealthReport> {
        let categories: Vec<Category> = self.active_connections().await.iter().map(|a| a.category).collect();
        let reports = futures::future::join_all(categories.iter().map(|c| self.check_health(*c))).await;
        categories
            .into_iter()
            .zip(reports)
            .filter_map(|(category, report)| report.map(|r| (category, r)))
            .collect()
    }

    /// Drop and re-establish the active client's resources, regardless of
    /// what was last recorded for it. `false` when nothing is active or the
    /// connect fails.
    #[instrument(skip(self), fields(category = %category), name = "registry_reconnect")]
    pub async fn reconnect(&self, category: Category) -> bool {
        let Some(active) = self.active(category).await else {
            return false;
        };

        active.client.disconnect().await;
        let connected = active.client.connect().await;
        let observation = if connected { HealthObservation::healthy() } else { HealthObservation::down() };
        self.observe(active.record_id, observation).await;

        if connected {
            info!(category = %category, connection_id = active.record_id, "Reconnected");
        } else {
            error!(category = %category, connection_id = active.record_id, "Reconnect failed");
        }
        connected
    }

    /// Enabled records that `category` could be switched to
    pub async fn candidates(&self, category: Category) -> Result<Vec<ConnectionRecord>> {
        Ok(self.store.list_by_category(category).await?.into_iter().filter(|r| r.is_enabled).collect())
    }

    /// Perform the startup switches selected by configuration. A switch that
    /// fails with a retryable error is attempted once more.
    pub async fn activate_configured(&self, bootstrap: &BootstrapConfig) -> BTreeMap<Category, bool> {
        let mut outcomes = BTreeMap::new();
        for (&category, &connection_id) in &bootstrap.active {
            let activated = match self.try_switch_connection(category, connection_id).await {
                Ok(_) => true,
                Err(e) if e.is_retryable() => {
                    warn!(
                        category = %category,
                        connection_id,
                        error_kind = e.kind(),
                        error = %e,
                        "Configured activation failed, retrying once"
                    );
                    tokio::time::sleep(ACTIVATION_RETRY_DELAY).await;
                    self.switch_connection(category, connection_id).await
                }
                Err(e) => {
                    warn!(
                        category = %category,
                        connection_id,
                        error_kind = e.kind(),
                        error = %e,
                        "Connection switch rejected"
                    );
                    false
                }
            };
            outcomes.insert(category, activated);
        }
        info!(
            requested = outcomes.len(),
            activated = outcomes.values().filter(|ok| **ok).count(),
            "Configured connections activated"
        );
        outcomes
    }

    /// Disconnect and forget every active client. Returns how many were released.
    ///
    /// Every category's epoch advances, including categories never activated,
    /// so a switch still connecting when this runs is rejected at the swap.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<ActiveConnection>> = {
            let mut slots = self.slots.write().await;
            for category in Category::ALL {
                slots.entry(category).or_default();
            }
            slots
                .values_mut()
                .filter_map(|slot| {
                    slot.epoch += 1;
                    slot.active.take()
                })
                .collect()
        };

        for active in &drained {
            self.release(active).await;
        }
        info!(released = drained.len(), "Connection registry shut down");
        drained.len()
    }
}
