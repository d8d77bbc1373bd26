//! Error types for broker-hub.

use broker_relay::RelayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("usage: perpetualId:chainId")]
    InvalidTopic(String),

    #[error("client already subscribed")]
    AlreadySubscribed,

    /// Write failure or timeout. Handled as a disconnect.
    #[error("Send failed: {0}")]
    Send(String),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HubResult<T> = Result<T, HubError>;
