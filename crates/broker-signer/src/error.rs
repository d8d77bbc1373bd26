//! Signer error types.

use alloy::primitives::Address;
use broker_core::ChainId;
use thiserror::Error;

/// Signing engine errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("No broker wallet for chain {0}")]
    NoWalletForChain(ChainId),

    #[error("No broker key defined for chain {0}")]
    NoSigningKey(ChainId),

    #[error("Invalid big number in {field}: {value:?}")]
    InvalidNumericField { field: &'static str, value: String },

    #[error("Perpetual id {0} does not fit in uint24")]
    PerpetualIdOutOfRange(u32),

    #[error("Multipay contract mismatch, expected {expected} on chain {chain_id}")]
    MultiPayContractMismatch { chain_id: ChainId, expected: Address },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signing failed: {0}")]
    SigningFailed(#[from] alloy::signers::Error),
}

pub type SignerResult<T> = Result<T, SignerError>;

/// Key loading errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
