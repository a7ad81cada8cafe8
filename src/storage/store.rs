//! Read/telemetry access to connection records.

use crate::domain::{Category, ConnectionRecord, HealthObservation};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;

/// Source of connection records for the registry.
///
/// Records are created and edited elsewhere; the registry only looks them up
/// and reports what it observed.
#[async_trait]
pub trait ConnectionStore: Send + Sync + fmt::Debug {
    /// Look up a record by id; `Ok(None)` when absent
    async fn get(&self, id: i64) -> Result<Option<ConnectionRecord>>;

    /// Records of one category ordered by id, enabled or not
    async fn list_by_category(&self, category: Category) -> Result<Vec<ConnectionRecord>>;

    /// Persist status/health/timestamps observed for a record
    async fn record_observation(&self, id: i64, observation: &HealthObservation) -> Result<()>;
}

/// Process-local store, for embedding and tests
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    records: RwLock<BTreeMap<i64, ConnectionRecord>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ConnectionRecord>) -> Self {
        Self { records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()) }
    }

    /// Insert or replace a record
    pub async fn insert(&self, record: ConnectionRecord) {
        self.records.write().await.insert(record.id, record);
    }

    /// Snapshot of every record, ordered by id
    pub async fn records(&self) -> Vec<ConnectionRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn get(&self, id: i64) -> Result<Option<ConnectionRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_by_category(&self, category: Category) -> Result<Vec<ConnectionRecord>> {
        Ok(self.records.read().await.values().filter(|r| r.category == category).cloned().collect())
    }

    async fn record_observation(&self, id: i64, observation: &HealthObservation) -> Result<()> {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.apply(observation);
        }
        Ok(())
    }
}
