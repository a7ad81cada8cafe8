//! Common test utilities for all integration tests.
//!
//! Provides an instrumented mock backend, a factory that remembers every
//! client it built, and helpers for sealed connection records.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use backplane::backends::{BackendClient, BackendSession, ClientFactory, ClientSpec, HealthReport, QueryResult};
use backplane::domain::{Category, ConnectionRecord};
use backplane::secrets::{CredentialCodec, CredentialKeyConfig};
use backplane::storage::InMemoryConnectionStore;
use backplane::{BackplaneError, ConnectionRegistry, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MOCK_PROVIDER: &str = "mock";

pub fn test_codec() -> Arc<CredentialCodec> {
    Arc::new(CredentialCodec::new(&CredentialKeyConfig::from_key_bytes(&[7u8; 32], "integration")).unwrap())
}

/// Backend whose lifecycle calls are counted
#[derive(Debug)]
pub struct MockClient {
    pub name: String,
    pub reachable: bool,
    pub connect_delay: Duration,
    pub connected: AtomicBool,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
}

impl MockClient {
    pub fn disconnects(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendClient for MockClient {
    fn provider(&self) -> &str {
        MOCK_PROVIDER
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> bool {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        self.connected.store(self.reachable, Ordering::SeqCst);
        self.reachable
    }

    async fn disconnect(&self) -> bool {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        true
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn test_connection(&self) -> bool {
        self.reachable && self.is_connected().await
    }

    async fn get_session(&self, _target: Option<&str>) -> Result<BackendSession> {
        Err(BackplaneError::internal("mock backend has no sessions"))
    }

    async fn execute_query(&self, _target: Option<&str>, _query: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::default())
    }

    async fn health_check(&self) -> HealthReport {
        let healthy = self.test_connection().await;
        HealthReport::new(MOCK_PROVIDER, self.is_connected().await, healthy).with_detail("name", self.name.clone())
    }
}

/// Every mock client built so far, in construction order
#[derive(Debug, Clone, Default)]
pub struct BuiltClients(Arc<Mutex<Vec<Arc<MockClient>>>>);

impl BuiltClients {
    pub fn all(&self) -> Vec<Arc<MockClient>> {
        self.0.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<Arc<MockClient>> {
        self.all().into_iter().filter(|c| c.name == name).collect()
    }
}

/// Built-in providers plus `mock`, whose envelope is
/// `{"reachable": bool, "delay_ms": int}`
pub fn factory_with_mock() -> (ClientFactory, BuiltClients) {
    let built = BuiltClients::default();
    let sink = built.clone();
    let mut factory = ClientFactory::builtin(Default::default());
    factory.register(MOCK_PROVIDER, move |spec: ClientSpec| {
        let client = Arc::new(MockClient {
            name: spec.name,
            reachable: spec.credentials["reachable"].as_bool().unwrap_or(true),
            connect_delay: Duration::from_millis(spec.credentials["delay_ms"].as_u64().unwrap_or(0)),
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        });
        sink.0.lock().unwrap().push(Arc::clone(&client));
        Ok(client as Arc<dyn BackendClient>)
    });
    (factory, built)
}

pub fn sealed_record(
    codec: &CredentialCodec,
    id: i64,
    category: Category,
    provider: &str,
    credentials: Value,
) -> ConnectionRecord {
    let ciphertext = codec.encrypt(&credentials).unwrap();
    ConnectionRecord::new(id, format!("connection-{}", id), category, provider, ciphertext)
}

pub fn mock_record(codec: &CredentialCodec, id: i64, category: Category) -> ConnectionRecord {
    sealed_record(codec, id, category, MOCK_PROVIDER, json!({"reachable": true}))
}

pub struct Harness {
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<InMemoryConnectionStore>,
    pub codec: Arc<CredentialCodec>,
    pub built: BuiltClients,
}

/// Fresh registry over an in-memory store holding `records`
pub fn harness(build: impl FnOnce(&CredentialCodec) -> Vec<ConnectionRecord>) -> Harness {
    let codec = test_codec();
    let store = Arc::new(InMemoryConnectionStore::with_records(build(&codec)));
    let (factory, built) = factory_with_mock();
    let registry = Arc::new(ConnectionRegistry::new(store.clone(), codec.clone(), factory));
    Harness { registry, store, codec, built }
}
