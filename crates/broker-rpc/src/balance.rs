//! Leased ERC-20 balance reads.
//!
//! Every read follows the lease discipline: acquire a short lease, perform
//! one `balanceOf` round trip, release immediately. Transient failures are
//! retried a bounded number of times with a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use broker_core::{ChainId, EndpointKind, RebateToken};
use broker_store::BoxFuture;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{RpcError, RpcResult};
use crate::lease::RpcLeasePool;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool ok);
    }
}

/// Largest scale `Decimal` can represent.
const MAX_DECIMAL_SCALE: u8 = 28;

fn default_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    2_000
}

/// Fixed-delay retry bounds for balance reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Human-unit token balance of `owner`, e.g. `1.5` for 1.5 tokens.
pub trait BalanceReader: Send + Sync {
    fn balance_of<'a>(
        &'a self,
        chain_id: ChainId,
        token: &'a RebateToken,
        owner: Address,
    ) -> BoxFuture<'a, RpcResult<Decimal>>;
}

/// One raw `balanceOf` call against a specific endpoint.
pub trait BalanceCall: Send + Sync {
    fn call<'a>(&'a self, url: &'a str, token: Address, owner: Address)
        -> BoxFuture<'a, RpcResult<U256>>;
}

/// [`BalanceCall`] over JSON-RPC/HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpBalanceCall;

impl BalanceCall for HttpBalanceCall {
    fn call<'a>(
        &'a self,
        url: &'a str,
        token: Address,
        owner: Address,
    ) -> BoxFuture<'a, RpcResult<U256>> {
        Box::pin(async move {
            let endpoint = Url::parse(url).map_err(|e| RpcError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            let provider = ProviderBuilder::new().on_http(endpoint);
            let contract = IERC20::new(token, provider);
            let result = contract
                .balanceOf(owner)
                .call()
                .await
                .map_err(|e| RpcError::Call(e.to_string()))?;
            Ok(result.balance)
        })
    }
}

/// [`BalanceReader`] that leases an HTTPS endpoint per attempt.
pub struct LeasedBalanceReader<C = HttpBalanceCall> {
    pool: Arc<RpcLeasePool>,
    call: C,
    retry: RetryPolicy,
    lease_secs: u64,
}

impl LeasedBalanceReader<HttpBalanceCall> {
    pub fn new(pool: Arc<RpcLeasePool>, retry: RetryPolicy) -> Self {
        Self::with_call(pool, HttpBalanceCall, retry)
    }
}

impl<C: BalanceCall> LeasedBalanceReader<C> {
    pub fn with_call(pool: Arc<RpcLeasePool>, call: C, retry: RetryPolicy) -> Self {
        let lease_secs = pool.config().lease_secs;
        Self {
            pool,
            call,
            retry,
            lease_secs,
        }
    }

    async fn attempt(
        &self,
        chain_id: ChainId,
        token: &RebateToken,
        owner: Address,
    ) -> RpcResult<Decimal> {
        let receipt = self
            .pool
            .acquire(chain_id, EndpointKind::Https, self.lease_secs)
            .await?;
        let result = self.call.call(&receipt.url, token.address, owner).await;
        if let Err(e) = self.pool.release(&receipt).await {
            // The lease still expires on its own.
            warn!(chain_id, error = %e, "Failed to release RPC lease");
        }
        Ok(to_decimal(result?, token.decimals))
    }
}

impl<C: BalanceCall> BalanceReader for LeasedBalanceReader<C> {
    fn balance_of<'a>(
        &'a self,
        chain_id: ChainId,
        token: &'a RebateToken,
        owner: Address,
    ) -> BoxFuture<'a, RpcResult<Decimal>> {
        Box::pin(async move {
            let attempts = self.retry.attempts.max(1);
            let mut last_error = String::new();
            for attempt in 1..=attempts {
                match self.attempt(chain_id, token, owner).await {
                    Ok(balance) => {
                        debug!(chain_id, token = %token.name, attempt, "Token balance read");
                        return Ok(balance);
                    }
                    Err(e) => {
                        warn!(
                            chain_id,
                            token = %token.name,
                            attempt,
                            error = %e,
                            "Balance query failed"
                        );
                        last_error = e.to_string();
                        if attempt < attempts {
                            tokio::time::sleep(Duration::from_millis(self.retry.delay_ms)).await;
                        }
                    }
                }
            }
            Err(RpcError::Unavailable {
                attempts,
                last_error,
            })
        })
    }
}

/// Scale a raw token amount by `decimals`, saturating at `Decimal::MAX`.
///
/// Digits beyond 28 decimal places are truncated.
pub fn to_decimal(raw: U256, decimals: u8) -> Decimal {
    let unit = U256::from(10u64).pow(U256::from(decimals));
    let whole = raw / unit;
    let mut fraction = raw % unit;

    let Some(whole) = u128::try_from(whole).ok().and_then(Decimal::from_u128) else {
        return Decimal::MAX;
    };

    let mut scale = decimals;
    if scale > MAX_DECIMAL_SCALE {
        fraction /= U256::from(10u64).pow(U256::from(scale - MAX_DECIMAL_SCALE));
        scale = MAX_DECIMAL_SCALE;
    }
    // fraction < 10^28 fits in i128.
    let fraction = i128::try_from(fraction).unwrap_or_default();
    whole
        .checked_add(Decimal::from_i128_with_scale(fraction, u32::from(scale)))
        .unwrap_or(Decimal::MAX)
}
