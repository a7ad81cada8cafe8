//! Provider tag to client constructor mapping.
//!
//! The built-in tags are registered by [`ClientFactory::builtin`]; additional
//! providers can be added with [`ClientFactory::register`] without touching
//! the registry.

use super::client::BackendClient;
use super::columnar::ColumnarAnalyticsClient;
use super::file_relational::FileRelationalClient;
use super::http_api::HttpApiClient;
use super::networked::NetworkedRelationalClient;
use crate::config::BackendSettings;
use crate::domain::{ConnectionRecord, Environment, ProviderKind};
use crate::errors::{BackplaneError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything a constructor needs to build a client for one record
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub name: String,
    pub environment: Environment,
    pub credentials: Value,
}

pub type ClientConstructor = Arc<dyn Fn(ClientSpec) -> Result<Arc<dyn BackendClient>> + Send + Sync>;

/// Builds unconnected clients from decrypted connection records
#[derive(Clone)]
pub struct ClientFactory {
    constructors: HashMap<String, ClientConstructor>,
}

impl ClientFactory {
    /// Factory with no providers registered
    pub fn empty() -> Self {
        Self { constructors: HashMap::new() }
    }

    /// Factory with the four built-in providers
    pub fn builtin(settings: BackendSettings) -> Self {
        let settings = Arc::new(settings);
        let mut factory = Self::empty();

        let s = Arc::clone(&settings);
        factory.register(ProviderKind::FileRelational.as_str(), move |spec: ClientSpec| {
            let client = FileRelationalClient::from_credentials(&spec.name, &spec.credentials, &s)?;
            Ok(Arc::new(client) as Arc<dyn BackendClient>)
        });

        let s = Arc::clone(&settings);
        factory.register(ProviderKind::ColumnarAnalytics.as_str(), move |spec: ClientSpec| {
            let client = ColumnarAnalyticsClient::from_credentials(&spec.name, &spec.credentials, &s)?;
            Ok(Arc::new(client) as Arc<dyn BackendClient>)
        });

        let s = Arc::clone(&settings);
        factory.register(ProviderKind::NetworkedRelational.as_str(), move |spec: ClientSpec| {
            let client = NetworkedRelationalClient::from_credentials(&spec.name, &spec.credentials, &s)?;
            Ok(Arc::new(client) as Arc<dyn BackendClient>)
        });

        let s = settings;
        factory.register(ProviderKind::HttpApi.as_str(), move |spec: ClientSpec| {
            let client = HttpApiClient::from_credentials(&spec.name, &spec.credentials, &s)?;
            Ok(Arc::new(client) as Arc<dyn BackendClient>)
        });

        factory
    }

    /// Register (or replace) the constructor for a provider tag
    pub fn register<F>(&mut self, provider: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(ClientSpec) -> Result<Arc<dyn BackendClient>> + Send + Sync + 'static,
    {
        self.constructors.insert(provider.into(), Arc::new(constructor));
        self
    }

    pub fn is_registered(&self, provider: &str) -> bool {
        self.constructors.contains_key(provider)
    }

    /// Registered provider tags, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.constructors.keys().cloned().collect();
        providers.sort();
        providers
    }

    /// Build an unconnected client for `record` from its decrypted payload
    pub fn build(&self, record: &ConnectionRecord, credentials: Value) -> Result<Arc<dyn BackendClient>> {
        let constructor = self
            .constructors
            .get(&record.provider)
            .ok_or_else(|| BackplaneError::unknown_provider(record.provider.clone()))?;
        constructor(ClientSpec { name: record.name.clone(), environment: record.environment, credentials })
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::builtin(BackendSettings::default())
    }
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory").field("providers", &self.providers()).finish()
    }
}
