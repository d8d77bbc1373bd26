//! Error types for broker-fee.

use broker_core::ChainId;
use broker_store::StoreError;
use thiserror::Error;

/// Fee resolution errors.
///
/// None of these fail a fee lookup: the cache degrades to the base fee.
#[derive(Debug, Error)]
pub enum FeeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt fee record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid VIP reductions: {0}")]
    InvalidReductions(String),

    #[error("No fee configuration for chain {0}")]
    UnknownChain(ChainId),
}

pub type FeeResult<T> = Result<T, FeeError>;
