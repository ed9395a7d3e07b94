//! Error types for the ingestion crate.

use thiserror::Error;

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion error types.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (bind failure, socket error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage error surfaced from the device store.
    #[error("Storage error: {0}")]
    Storage(#[from] devpulse_storage::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
