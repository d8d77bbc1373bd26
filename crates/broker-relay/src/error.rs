//! Error types for broker-relay.

use broker_store::StoreError;
use thiserror::Error;

/// Order relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The staging TTL lapsed or the id was never signed here.
    #[error("Could not find id {0} - expired or never submitted")]
    OrderExpiredOrUnknown(String),

    #[error("Corrupt staged order {order_id}: {reason}")]
    Corrupt { order_id: String, reason: String },
}

pub type RelayResult<T> = Result<T, RelayError>;
