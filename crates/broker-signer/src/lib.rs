//! Broker signing engine.
//!
//! One wallet per supported chain, all derived from a single broker key.
//! Produces EIP-712 broker authorizations for orders, order digests and ids
//! for the relay, and broker countersignatures for executor payments.
//!
//! Key material is loaded through [`KeySource`] and never logged.

pub mod error;
pub mod keys;
pub mod pen;
pub mod typed;
pub mod wallet;

pub use error::{KeyError, SignerError, SignerResult};
pub use keys::{load_signer, KeySource};
pub use pen::{encode_signature, recover_evm_address, OrderDigest, OrderSignature, SignaturePen};
pub use wallet::Wallet;
