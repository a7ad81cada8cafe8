//! # Error Handling
//!
//! Error taxonomy for the connection backplane. Lifecycle operations on
//! backend clients never surface these (they log and return `false`); data
//! access and switch attempts do.

pub mod types;

pub use types::{BackplaneError, Result};
