//! # Backplane
//!
//! Multi-backend connection management. Callers address logical categories
//! (authentication store, analytics store, AI/LLM provider, brokerage API,
//! social-media API) and the registry decides which concrete backend serves
//! each one right now.
//!
//! ## Architecture
//!
//! ```text
//! ConnectionRouter → ConnectionRegistry → ClientFactory → BackendClient
//!                           ↓                                  ↓
//!                   ConnectionStore + CredentialCodec    SQLite / DuckDB / PostgreSQL / HTTP
//! ```
//!
//! ## Core Components
//!
//! - **CredentialCodec**: AES-256-GCM sealed JSON credential envelopes
//! - **BackendClient**: one lifecycle contract over four backend kinds
//! - **ConnectionRegistry**: per-category active client with hot swapping
//! - **ConnectionRouter**: one named accessor and switch per category
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use backplane::{AppConfig, Backplane, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let backplane = Backplane::from_config(&config).await?;
//!     backplane.activate(&config).await;
//!
//!     if let Some(broker) = backplane.router().get_broker_client().await {
//!         println!("{}", broker.health_check().await.to_json());
//!     }
//!
//!     backplane.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod secrets;
pub mod startup;
pub mod storage;

pub use backends::{BackendClient, BackendSession, ClientFactory, HealthReport, QueryResult};
pub use config::AppConfig;
pub use domain::{Category, ConnectionRecord, ProviderKind};
pub use errors::{BackplaneError, Result};
pub use registry::{ConnectionRegistry, ConnectionRouter};
pub use secrets::CredentialCodec;
pub use startup::Backplane;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
