//! Named per-category surface over the registry.

use super::manager::ConnectionRegistry;
use crate::backends::{BackendClient, BackendSession};
use crate::domain::Category;
use crate::errors::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One accessor and one switch per category, all delegating to the registry
#[derive(Debug, Clone)]
pub struct ConnectionRouter {
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    async fn session(&self, category: Category, target: Option<&str>) -> Result<Option<BackendSession>> {
        match self.registry.get_client(category).await {
            Some(client) => client.get_session(target).await.map(Some),
            None => Ok(None),
        }
    }

    /// Session on the authentication store's default database
    pub async fn get_auth_db(&self) -> Result<Option<BackendSession>> {
        self.session(Category::Auth, None).await
    }

    /// Session on an analytics sub-database; `None` selects the default one
    pub async fn get_analytics_db(&self, sub_db_name: Option<&str>) -> Result<Option<BackendSession>> {
        self.session(Category::Analytics, sub_db_name).await
    }

    pub async fn get_auth_client(&self) -> Option<Arc<dyn BackendClient>> {
        self.registry.get_client(Category::Auth).await
    }

    pub async fn get_analytics_client(&self) -> Option<Arc<dyn BackendClient>> {
        self.registry.get_client(Category::Analytics).await
    }

    pub async fn get_ai_llm_client(&self) -> Option<Arc<dyn BackendClient>> {
        self.registry.get_client(Category::AiLlm).await
    }

    pub async fn get_broker_client(&self) -> Option<Arc<dyn BackendClient>> {
        self.registry.get_client(Category::Broker).await
    }

    pub async fn get_social_media_client(&self) -> Option<Arc<dyn BackendClient>> {
        self.registry.get_client(Category::SocialMedia).await
    }

    pub async fn switch_auth(&self, connection_id: i64) -> bool {
        self.registry.switch_connection(Category::Auth, connection_id).await
    }

    pub async fn switch_analytics(&self, connection_id: i64) -> bool {
        self.registry.switch_connection(Category::Analytics, connection_id).await
    }

    pub async fn switch_ai_llm(&self, connection_id: i64) -> bool {
        self.registry.switch_connection(Category::AiLlm, connection_id).await
    }

    pub async fn switch_broker(&self, connection_id: i64) -> bool {
        self.registry.switch_connection(Category::Broker, connection_id).await
    }

    pub async fn switch_social_media(&self, connection_id: i64) -> bool {
        self.registry.switch_connection(Category::SocialMedia, connection_id).await
    }

    /// Health of every category as one JSON object keyed by category.
    ///
    /// Categories with nothing active map to `null`; active ones carry the
    /// connection metadata under `connection` and the probe under `health`.
    pub async fn health_report(&self) -> Value {
        let reports = self.registry.check_all().await;
        let mut categories = Map::new();
        for category in Category::ALL {
            let entry = match (self.registry.active(category).await, reports.get(&category)) {
                (Some(active), Some(report)) => {
                    let mut entry = Map::new();
                    entry.insert("connection".to_string(), active.summary());
                    entry.insert("health".to_string(), report.to_json());
                    Value::Object(entry)
                }
                _ => Value::Null,
            };
            categories.insert(category.as_str().to_string(), entry);
        }
        Value::Object(categories)
    }
}
