//! Per-chain broker wallet.

use std::fmt;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use broker_core::ChainId;

use crate::error::{SignerError, SignerResult};

/// Broker identity bound to one chain.
///
/// A wallet without a key is observer-only: it knows its address but every
/// signing attempt fails with `NoSigningKey`.
#[derive(Clone)]
pub struct Wallet {
    chain_id: ChainId,
    address: Address,
    signer: Option<PrivateKeySigner>,
}

impl Wallet {
    pub fn new(chain_id: ChainId, signer: PrivateKeySigner) -> Self {
        Self {
            chain_id,
            address: signer.address(),
            signer: Some(signer),
        }
    }

    pub fn observer(chain_id: ChainId, address: Address) -> Self {
        Self {
            chain_id,
            address,
            signer: None,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    pub(crate) fn signing_key(&self) -> SignerResult<&PrivateKeySigner> {
        self.signer
            .as_ref()
            .ok_or(SignerError::NoSigningKey(self.chain_id))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("chain_id", &self.chain_id)
            .field("address", &self.address)
            .field("can_sign", &self.can_sign())
            .finish()
    }
}
