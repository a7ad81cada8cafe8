//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.

use crate::config::ObservabilityConfig;
use crate::errors::{BackplaneError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for a registry operation on one category.
///
/// ```rust,ignore
/// let span = connection_span!("switch", Category::Broker, connection_id = 8);
/// ```
#[macro_export]
macro_rules! connection_span {
    ($operation:expr, $category:expr) => {
        tracing::info_span!(
            "connection_operation",
            operation = %$operation,
            category = %$category,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $category:expr, $($field:tt)*) => {
        tracing::info_span!(
            "connection_operation",
            operation = %$operation,
            category = %$category,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a backend-native operation
#[macro_export]
macro_rules! backend_span {
    ($operation:expr, $provider:expr, $target:expr) => {
        tracing::debug_span!(
            "backend_operation",
            operation = %$operation,
            provider = %$provider,
            target = %$target
        )
    };
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber is already installed (tests, embedding
/// applications) instead of failing.
pub fn init_logging(config: &ObservabilityConfig) -> Result<bool> {
    let filter = EnvFilter::try_new(&config.log_level).map_err(|e| {
        BackplaneError::config(format!("Invalid log filter '{}': {}", config.log_level, e))
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init().is_ok()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init().is_ok()
    };

    if installed {
        tracing::info!(
            service_name = %config.service_name,
            log_level = %config.log_level,
            json = config.json_logging,
            "Logging initialized"
        );
    }

    Ok(installed)
}
