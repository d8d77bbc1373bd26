//! Payment-token spending approvals for the multipay contract.
//!
//! [`ApprovalGate`] answers "may the multipay contract pull this token?" for
//! each `(chain, token)` pair. Tokens listed in the chain registry are
//! approved up front. Others are delegated to an optional on-chain approver,
//! and a success is remembered for the life of the process.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use broker_core::{ChainConfig, ChainId, ChainRegistry, EndpointKind};
use broker_store::BoxFuture;
use dashmap::DashSet;
use tracing::{debug, info, warn};

use crate::balance::IERC20;
use crate::error::{RpcError, RpcResult};
use crate::lease::RpcLeasePool;

/// Allowance at or above which a token counts as approved.
const SUFFICIENT_ALLOWANCE: U256 = U256::from_limbs([0, 0, 0, 1 << 63]);

/// Confirms the multipay contract may spend `token` on behalf of the broker.
pub trait TokenApproval: Send + Sync {
    fn ensure_approved<'a>(
        &'a self,
        chain: &'a ChainConfig,
        token: Address,
    ) -> BoxFuture<'a, RpcResult<()>>;
}

/// Memoising gate in front of an optional on-chain approver.
pub struct ApprovalGate {
    approved: DashSet<(ChainId, Address)>,
    on_chain: Option<Arc<dyn TokenApproval>>,
}

impl ApprovalGate {
    /// Seed with every chain's pre-approved tokens.
    pub fn new(registry: &ChainRegistry, on_chain: Option<Arc<dyn TokenApproval>>) -> Self {
        let approved = DashSet::new();
        for chain in registry.iter() {
            for token in &chain.approved_tokens {
                approved.insert((chain.chain_id, *token));
            }
        }
        Self { approved, on_chain }
    }

    pub fn is_approved(&self, chain_id: ChainId, token: Address) -> bool {
        self.approved.contains(&(chain_id, token))
    }
}

impl TokenApproval for ApprovalGate {
    fn ensure_approved<'a>(
        &'a self,
        chain: &'a ChainConfig,
        token: Address,
    ) -> BoxFuture<'a, RpcResult<()>> {
        Box::pin(async move {
            let key = (chain.chain_id, token);
            if self.approved.contains(&key) {
                return Ok(());
            }
            let Some(on_chain) = &self.on_chain else {
                return Err(RpcError::NotApproved {
                    chain_id: chain.chain_id,
                    token,
                });
            };
            on_chain.ensure_approved(chain, token).await?;
            self.approved.insert(key);
            Ok(())
        })
    }
}

/// Sends `approve(multipay, MAX)` from the broker wallet when the current
/// allowance is short.
pub struct OnChainApprover {
    pool: Arc<RpcLeasePool>,
    signer: PrivateKeySigner,
    lease_secs: u64,
}

impl OnChainApprover {
    /// `lease_secs` must cover a transaction round trip including its receipt.
    pub fn new(pool: Arc<RpcLeasePool>, signer: PrivateKeySigner, lease_secs: u64) -> Self {
        Self {
            pool,
            signer,
            lease_secs,
        }
    }

    async fn approve_via(&self, url: &str, chain: &ChainConfig, token: Address) -> RpcResult<()> {
        let endpoint = Url::parse(url).map_err(|e| RpcError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .on_http(endpoint);
        let erc20 = IERC20::new(token, provider);
        let spender = chain.multipay_contract;

        let allowance = erc20
            .allowance(self.signer.address(), spender)
            .call()
            .await
            .map_err(|e| RpcError::Call(e.to_string()))?
            .remaining;
        if allowance >= SUFFICIENT_ALLOWANCE {
            debug!(chain_id = chain.chain_id, %token, "Allowance already sufficient");
            return Ok(());
        }

        let receipt = erc20
            .approve(spender, U256::MAX)
            .send()
            .await
            .map_err(|e| RpcError::Approval(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| RpcError::Approval(e.to_string()))?;
        if !receipt.status() {
            return Err(RpcError::Approval(format!(
                "transaction {} reverted",
                receipt.transaction_hash
            )));
        }
        info!(
            chain_id = chain.chain_id,
            %token,
            tx = %receipt.transaction_hash,
            "Token spending approved"
        );
        Ok(())
    }
}

impl TokenApproval for OnChainApprover {
    fn ensure_approved<'a>(
        &'a self,
        chain: &'a ChainConfig,
        token: Address,
    ) -> BoxFuture<'a, RpcResult<()>> {
        Box::pin(async move {
            let receipt = self
                .pool
                .acquire(chain.chain_id, EndpointKind::Https, self.lease_secs)
                .await?;
            let result = self.approve_via(&receipt.url, chain, token).await;
            if let Err(e) = self.pool.release(&receipt).await {
                warn!(chain_id = chain.chain_id, error = %e, "Failed to release RPC lease");
            }
            result
        })
    }
}
