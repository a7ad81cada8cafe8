//! Integration tests for configuration management
//!
//! These tests validate that the configuration system reads environment
//! variables and that a process started from it activates the configured
//! connections against a real record store.

use backplane::config::AppConfig;
use backplane::domain::{Category, ConnectionHealth, ConnectionStatus, Environment};
use backplane::storage::CreateConnectionRequest;
use backplane::{Backplane, CredentialCodec, Result};
use serde_json::json;
use std::env;
use std::sync::Mutex;
use std::time::Duration;

// Use a mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const TEST_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

const MANAGED_VARS: &[&str] = &[
    "BACKPLANE_DATABASE_URL",
    "BACKPLANE_CREDENTIAL_KEY",
    "BACKPLANE_CREDENTIAL_KEY_VERSION",
    "BACKPLANE_HTTP_TIMEOUT_SECONDS",
    "BACKPLANE_ANALYTICS_DATA_DIR",
    "BACKPLANE_ACTIVE_AUTH",
    "BACKPLANE_ACTIVE_BROKER",
];

/// Restores the managed variables when dropped
struct EnvSnapshot(Vec<(&'static str, Option<String>)>);

impl EnvSnapshot {
    fn take() -> Self {
        let saved = MANAGED_VARS.iter().map(|key| (*key, env::var(key).ok())).collect();
        for key in MANAGED_VARS {
            env::remove_var(key);
        }
        Self(saved)
    }
}

impl Drop for EnvSnapshot {
    fn drop(&mut self) {
        for (key, value) in &self.0 {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }
}

/// Test that configuration properly reads environment variables
#[test]
fn test_config_environment_integration() -> Result<()> {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _env = EnvSnapshot::take();

    env::set_var("BACKPLANE_CREDENTIAL_KEY", TEST_KEY);
    env::set_var("BACKPLANE_CREDENTIAL_KEY_VERSION", "v2");
    env::set_var("BACKPLANE_HTTP_TIMEOUT_SECONDS", "12");
    env::set_var("BACKPLANE_ACTIVE_BROKER", "8");

    let config = AppConfig::from_env()?;
    assert_eq!(config.credentials.key_version, "v2");
    assert_eq!(config.backends.http_timeout(), Duration::from_secs(12));
    assert_eq!(config.bootstrap.active.get(&Category::Broker), Some(&8));
    assert!(!config.bootstrap.active.contains_key(&Category::Auth));

    // Out-of-range values fail validation
    env::set_var("BACKPLANE_HTTP_TIMEOUT_SECONDS", "0");
    assert!(AppConfig::from_env().is_err());

    Ok(())
}

#[test]
fn test_missing_credential_key_is_a_config_error() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _env = EnvSnapshot::take();

    let err = AppConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("BACKPLANE_CREDENTIAL_KEY"));
}

#[test]
fn test_invalid_activation_id_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _env = EnvSnapshot::take();

    env::set_var("BACKPLANE_CREDENTIAL_KEY", TEST_KEY);
    env::set_var("BACKPLANE_ACTIVE_AUTH", "first");
    assert!(AppConfig::from_env().is_err());
}

/// A process configured from the environment activates its connections and
/// writes the outcome back to the record store.
#[test]
fn test_startup_from_environment() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _env = EnvSnapshot::take();
    let dir = tempfile::tempdir().unwrap();

    env::set_var("BACKPLANE_DATABASE_URL", format!("sqlite://{}", dir.path().join("records.db").display()));
    env::set_var("BACKPLANE_CREDENTIAL_KEY", TEST_KEY);
    env::set_var("BACKPLANE_ANALYTICS_DATA_DIR", dir.path().join("analytics").display().to_string());
    let config = AppConfig::from_env().unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let backplane = Backplane::from_config(&config).await.unwrap();
        let codec = CredentialCodec::new(&config.credentials).unwrap();

        let users_db = dir.path().join("auth/users.db");
        let record = backplane
            .repository()
            .create(CreateConnectionRequest {
                name: "users".to_string(),
                category: Category::Auth,
                provider: "file-relational".to_string(),
                credentials: codec.encrypt(&json!({"path": users_db.to_str().unwrap()})).unwrap(),
                environment: Environment::Prod,
                is_enabled: true,
            })
            .await
            .unwrap();

        let mut config = config.clone();
        config.bootstrap.active.insert(Category::Auth, record.id);
        config.bootstrap.active.insert(Category::Broker, 404);

        let outcomes = backplane.activate(&config).await;
        assert_eq!(outcomes.get(&Category::Auth), Some(&true));
        assert_eq!(outcomes.get(&Category::Broker), Some(&false));
        assert!(users_db.exists());

        let stored = backplane.repository().get_by_id(record.id).await.unwrap();
        assert_eq!(stored.status, ConnectionStatus::Connected);
        assert_eq!(stored.health, ConnectionHealth::Healthy);
        assert!(stored.last_success_at.is_some());

        assert_eq!(backplane.registry().shutdown().await, 1);
        let stored = backplane.repository().get_by_id(record.id).await.unwrap();
        assert_eq!(stored.status, ConnectionStatus::Disconnected);

        backplane.shutdown().await;
        assert!(backplane.pool().is_closed());
    });
}
