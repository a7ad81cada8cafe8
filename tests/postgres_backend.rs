// NOTE: This file requires PostgreSQL (via Testcontainers)
// To run these tests: cargo test --features postgres_tests
#![cfg(feature = "postgres_tests")]
//! Networked relational backend against a throwaway PostgreSQL container.

mod common;

use backplane::backends::{BackendClient, BackendSession, NetworkedRelationalClient};
use backplane::config::BackendSettings;
use backplane::domain::Category;
use backplane::registry::ConnectionRouter;
use common::{harness, sealed_record};
use serde_json::{json, Value};
use sqlx::Row;
use std::sync::Arc;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

/// PostgreSQL container plus the credential envelope pointing at it
struct TestServer {
    credentials: Value,
    _container: ContainerAsync<Postgres>,
}

impl TestServer {
    async fn start() -> Self {
        let container =
            Postgres::default().start().await.unwrap_or_else(|e| panic!("Failed to start PostgreSQL container: {}", e));
        let host = container.get_host().await.unwrap_or_else(|e| panic!("Failed to get container host: {}", e));
        let port =
            container.get_host_port_ipv4(5432).await.unwrap_or_else(|e| panic!("Failed to get container port: {}", e));

        let credentials = json!({
            "host": host.to_string(),
            "port": port,
            "database": "postgres",
            "username": "postgres",
            "password": "postgres",
        });
        Self { credentials, _container: container }
    }

    fn client(&self) -> NetworkedRelationalClient {
        NetworkedRelationalClient::from_credentials("warehouse", &self.credentials, &BackendSettings::default())
            .unwrap()
    }
}

#[tokio::test]
async fn test_lifecycle_and_health() {
    let server = TestServer::start().await;
    let client = server.client();

    assert!(!client.is_connected().await);
    assert!(client.connect().await);
    assert!(client.connect().await);
    assert!(client.test_connection().await);

    let report = client.health_check().await;
    assert!(report.is_healthy());
    assert_eq!(report.to_json()["type"], "networked-relational");
    let target = report.to_json()["target"].as_str().unwrap().to_string();
    assert!(target.contains("***"));
    assert!(!target.contains("postgres:postgres"));

    assert!(client.disconnect().await);
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_reads_writes_and_rollback() {
    let server = TestServer::start().await;
    let client = server.client();
    assert!(client.connect().await);

    client
        .execute_query(None, "CREATE TABLE positions (symbol TEXT PRIMARY KEY, qty BIGINT NOT NULL)", &[])
        .await
        .unwrap();

    let inserted = client
        .execute_query(
            None,
            "INSERT INTO positions (symbol, qty) VALUES ($1, $2) RETURNING symbol, qty",
            &[json!("AAPL"), json!(10)],
        )
        .await
        .unwrap();
    assert_eq!(inserted.rows[0]["qty"], 10);

    let updated = client
        .execute_query(None, "UPDATE positions SET qty = qty + $1", &[json!(5)])
        .await
        .unwrap();
    assert_eq!(updated.rows_affected, 1);

    // Duplicate key fails the write and leaves the table unchanged.
    let err = client
        .execute_query(None, "INSERT INTO positions (symbol, qty) VALUES ($1, $2)", &[json!("AAPL"), json!(1)])
        .await;
    assert!(err.is_err());

    let rows = client.execute_query(None, "SELECT symbol, qty FROM positions", &[]).await.unwrap();
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0]["qty"], 15);
}

#[tokio::test]
async fn test_router_session_through_registry() {
    let server = TestServer::start().await;
    let credentials = server.credentials.clone();
    let h = harness(move |codec| vec![sealed_record(codec, 3, Category::Auth, "networked-relational", credentials)]);
    let router = ConnectionRouter::new(Arc::clone(&h.registry));

    assert!(router.switch_auth(3).await);
    match router.get_auth_db().await.unwrap().unwrap() {
        BackendSession::NetworkedRelational(mut conn) => {
            let row = sqlx::query("SELECT 40 + 2 AS answer").fetch_one(&mut *conn).await.unwrap();
            assert_eq!(row.get::<i32, _>("answer"), 42);
        }
        other => panic!("unexpected session {:?}", other),
    }

    assert_eq!(h.registry.shutdown().await, 1);
}
