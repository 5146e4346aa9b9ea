//! # Lantern Common
//!
//! Configuration, error types, and logging setup shared by the Lantern crates.
//!
//! ## Features
//!
//! - `AgentConfig` with JSON loading and validation
//! - Logging configuration and setup

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{AgentConfig, NetworkConfig, NotificationDefaults, StorageBackend, StorageConfig};
pub use logging::{init_logging, LogConfig, LogFormat};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
