//! # Configuration Management
//!
//! Environment-driven configuration for the record store, backend defaults,
//! logging and startup activations.

pub mod settings;

pub use settings::{AppConfig, BackendSettings, BootstrapConfig, DatabaseConfig, ObservabilityConfig};
