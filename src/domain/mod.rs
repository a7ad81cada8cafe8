//! # Domain Model
//!
//! Connection records, categories and provider tags shared by every layer.

pub mod connection;

pub use connection::{
    Category, ConnectionHealth, ConnectionRecord, ConnectionStatus, Environment,
    HealthObservation, ProviderKind,
};
