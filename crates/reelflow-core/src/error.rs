//! Error types for Reelflow.

use thiserror::Error;

/// Main error type for Reelflow operations.
#[derive(Error, Debug)]
pub enum ReelflowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("Effect error: {0}")]
    Effect(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Synchronisation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ReelflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Reelflow operations.
pub type Result<T> = std::result::Result<T, ReelflowError>;
