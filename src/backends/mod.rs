//! # Backend Clients
//!
//! One [`BackendClient`] implementation per provider kind, plus the factory
//! that turns a decrypted connection record into an unconnected client.
//!
//! | Tag                    | Client                        | Sessions            |
//! |------------------------|-------------------------------|---------------------|
//! | `file-relational`      | [`FileRelationalClient`]      | pooled, per store   |
//! | `columnar-analytics`   | [`ColumnarAnalyticsClient`]   | cloned, per store   |
//! | `networked-relational` | [`NetworkedRelationalClient`] | pooled              |
//! | `http-api`             | [`HttpApiClient`]             | shared HTTP client  |

pub mod client;
pub mod columnar;
pub mod factory;
pub mod file_relational;
pub mod http_api;
pub mod networked;
mod rows;

pub use client::{BackendClient, BackendSession, HealthReport, HttpSession, ProbeStatus, QueryResult};
pub use columnar::{ColumnarAnalyticsClient, DEFAULT_ANALYTICS_STORES};
pub use factory::{ClientConstructor, ClientFactory, ClientSpec};
pub use file_relational::FileRelationalClient;
pub use http_api::HttpApiClient;
pub use networked::NetworkedRelationalClient;
