//! Domain types for the reseed gateway.
//!
//! This module contains the request model, configuration, and error handling.

pub mod config;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, ReseedConfig};
pub use error::{GatewayError, Rejection, ReseedError};
pub use types::*;
