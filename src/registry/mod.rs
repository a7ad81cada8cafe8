//! # Connection Registry and Router
//!
//! [`ConnectionRegistry`] owns the active client per category and performs
//! switches; [`ConnectionRouter`] gives callers one named accessor per
//! category on top of it.
//!
//! ```rust,ignore
//! let registry = Arc::new(ConnectionRegistry::new(store, codec, ClientFactory::builtin(settings)));
//! let router = ConnectionRouter::new(registry.clone());
//!
//! router.switch_broker(8).await;
//! if let Some(broker) = router.get_broker_client().await {
//!     let report = broker.health_check().await;
//! }
//! ```

mod managed;
pub mod manager;
pub mod router;

pub use manager::{ActiveConnection, ConnectionRegistry};
pub use router::ConnectionRouter;
