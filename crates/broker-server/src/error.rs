//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key error: {0}")]
    Key(#[from] broker_signer::KeyError),

    #[error("Store error: {0}")]
    Store(#[from] broker_store::StoreError),

    #[error("Lease error: {0}")]
    Lease(#[from] broker_rpc::LeaseError),

    #[error("Fee error: {0}")]
    Fee(#[from] broker_fee::FeeError),

    #[error("API error: {0}")]
    Api(#[from] broker_api::ApiError),

    #[error("Hub error: {0}")]
    Hub(#[from] broker_hub::HubError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<broker_core::CoreError> for AppError {
    fn from(e: broker_core::CoreError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
