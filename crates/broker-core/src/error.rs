//! Error types for broker-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or incomplete request. Surfaced as a 400 and never retried.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(u64),

    #[error("Duplicate chain in registry: {0}")]
    DuplicateChain(u64),

    #[error("Invalid staged order field {field}: {reason}")]
    InvalidStagedField { field: &'static str, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
