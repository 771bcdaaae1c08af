//! Platform-wide error type.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, HivemindError>;

/// Errors shared by all Hivemind crates.
#[derive(Error, Debug)]
pub enum HivemindError {
    /// Configuration could not be read, parsed, or written.
    #[error("config error: {0}")]
    Config(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
