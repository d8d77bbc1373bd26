//! Error types for broker-rpc.

use alloy::primitives::Address;
use broker_core::{ChainId, EndpointKind};
use broker_store::StoreError;
use thiserror::Error;

/// Lease pool errors.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No {kind} endpoints registered for chain {chain_id}")]
    NoEndpoints { chain_id: ChainId, kind: EndpointKind },

    #[error("Lease lifetime for {kind} endpoints on chain {chain_id} must be at least one second")]
    InvalidLeaseSecs { chain_id: ChainId, kind: EndpointKind },

    /// Every endpoint is leased. Retryable after backoff.
    #[error("All {kind} endpoints for chain {chain_id} are leased")]
    PoolExhausted { chain_id: ChainId, kind: EndpointKind },
}

impl LeaseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Store(_))
    }
}

pub type LeaseResult<T> = Result<T, LeaseError>;

/// RPC call errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("RPC call failed: {0}")]
    Call(String),

    #[error("Token {token} is not approved for chain {chain_id}")]
    NotApproved { chain_id: ChainId, token: Address },

    #[error("Approval transaction failed: {0}")]
    Approval(String),

    /// Retries exhausted. Callers degrade rather than fail.
    #[error("Endpoint unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

pub type RpcResult<T> = Result<T, RpcError>;
