//! # Observability Infrastructure
//!
//! Structured logging for the backplane. Health reporting lives with the
//! backends and the registry, which produce it.

pub mod logging;

pub use logging::init_logging;
