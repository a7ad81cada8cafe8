//! Registry-owned wrapper around every client it hands out.
//!
//! Once the registry releases a client (superseded by a switch, or drained
//! at shutdown) the wrapper is retired: callers still holding the `Arc` get
//! `Connectivity` errors instead of lazily reopening resources that nothing
//! would ever release again.

use crate::backends::{BackendClient, BackendSession, HealthReport, QueryResult};
use crate::errors::{BackplaneError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct ManagedClient {
    inner: Arc<dyn BackendClient>,
    retired: AtomicBool,
}

impl ManagedClient {
    pub(crate) fn new(inner: Arc<dyn BackendClient>) -> Self {
        Self { inner, retired: AtomicBool::new(false) }
    }

    /// Refuse further lifecycle and data access, then release resources.
    /// Returns the inner `disconnect` outcome.
    pub(crate) async fn retire(&self) -> bool {
        self.retired.store(true, Ordering::SeqCst);
        self.inner.disconnect().await
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_retired() {
            return Err(BackplaneError::connectivity(
                self.inner.provider(),
                format!("'{}' was released by the registry", self.inner.name()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendClient for ManagedClient {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn connect(&self) -> bool {
        !self.is_retired() && self.inner.connect().await
    }

    async fn disconnect(&self) -> bool {
        self.inner.disconnect().await
    }

    async fn is_connected(&self) -> bool {
        !self.is_retired() && self.inner.is_connected().await
    }

    async fn test_connection(&self) -> bool {
        !self.is_retired() && self.inner.test_connection().await
    }

    async fn get_session(&self, target: Option<&str>) -> Result<BackendSession> {
        self.ensure_active()?;
        self.inner.get_session(target).await
    }

    async fn execute_query(&self, target: Option<&str>, query: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_active()?;
        self.inner.execute_query(target, query, params).await
    }

    async fn health_check(&self) -> HealthReport {
        if self.is_retired() {
            return HealthReport::new(self.inner.provider(), false, false).with_detail("released", true);
        }
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::FileRelationalClient;
    use crate::config::BackendSettings;
    use serde_json::json;

    fn managed() -> ManagedClient {
        let client =
            FileRelationalClient::from_credentials("auth", &json!({"path": ":memory:"}), &BackendSettings::default())
                .unwrap();
        ManagedClient::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_delegates_while_active() {
        let client = managed();
        assert!(client.connect().await);
        assert_eq!(client.provider(), "file-relational");
        assert!(client.execute_query(None, "SELECT 1 AS one", &[]).await.is_ok());
        assert!(client.health_check().await.is_healthy());
    }

    #[tokio::test]
    async fn test_retired_client_does_not_reopen() {
        let client = managed();
        assert!(client.connect().await);
        assert!(client.retire().await);

        let err = client.execute_query(None, "SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, BackplaneError::Connectivity { .. }));
        assert!(client.get_session(None).await.is_err());
        assert!(!client.connect().await);
        assert!(!client.is_connected().await);

        let report = client.health_check().await;
        assert!(!report.connected);
        assert_eq!(report.to_json()["released"], true);
        // Retiring again is harmless
        assert!(client.retire().await);
    }
}
