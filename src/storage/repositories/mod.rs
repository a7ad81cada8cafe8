//! Repository modules for data access

pub mod connection;

pub use connection::{ConnectionRepository, CreateConnectionRequest};
