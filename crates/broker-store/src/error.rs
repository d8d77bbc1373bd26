//! Error types for broker-store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Key {0} holds a value of another type")]
    WrongType(String),

    #[error("Value at {key} is not an integer: {value}")]
    NotAnInteger { key: String, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
