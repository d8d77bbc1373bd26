//! Fee cache configuration.

use broker_rpc::RetryPolicy;
use serde::Deserialize;

/// Default VIP level endpoint. The trader address is appended as `?addr=`.
pub const DEFAULT_VIP_URL: &str = "https://dappapi.vip3.io/api/v1/sbt/info";

fn default_soft_ttl_secs() -> u64 {
    3_600
}

fn default_hard_ttl_secs() -> u64 {
    86_400
}

fn default_vip_url() -> String {
    DEFAULT_VIP_URL.to_string()
}

fn default_vip_cache_secs() -> u64 {
    7 * 86_400
}

/// Where fee multipliers come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultiplierSourceConfig {
    /// Rebate-token balances read on chain.
    Tokens,
    /// External VIP level mapped through per-chain reductions.
    Vip {
        #[serde(default = "default_vip_url")]
        url: String,
        /// `"chainId:p1,p2,...;chainId:..."`, percent reduction per level.
        reductions: String,
        #[serde(default = "default_vip_cache_secs")]
        cache_secs: u64,
    },
}

impl Default for MultiplierSourceConfig {
    fn default() -> Self {
        Self::Tokens
    }
}

/// Fee cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeeConfig {
    /// Age after which a cached multiplier is refreshed in the background.
    #[serde(default = "default_soft_ttl_secs")]
    pub soft_ttl_secs: u64,
    /// Store expiry of a cached multiplier.
    #[serde(default = "default_hard_ttl_secs")]
    pub hard_ttl_secs: u64,
    /// Retry bounds for each rebate-token balance read.
    #[serde(default)]
    pub balance_retry: RetryPolicy,
    #[serde(default)]
    pub source: MultiplierSourceConfig,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            soft_ttl_secs: default_soft_ttl_secs(),
            hard_ttl_secs: default_hard_ttl_secs(),
            balance_retry: RetryPolicy::default(),
            source: MultiplierSourceConfig::default(),
        }
    }
}
