//! Shared utilities for Warden: configuration, logging, error types.
//!
//! This crate provides common infrastructure used across all Warden components.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;

pub use config::WardenConfig;
pub use error::{Error, Result};

/// Initialize tracing.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
