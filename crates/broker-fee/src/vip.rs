//! VIP level multiplier source.
//!
//! A trader's VIP level is fetched from an external REST endpoint and cached
//! in the shared store under `VIP:<lowercase trader>`. Levels map onto
//! per-chain percent reductions configured as `"1101:50,75,90;196:50,75,90"`:
//! level `n` takes the `n`-th entry, levels beyond the list take the last
//! entry, and level 0 pays the full fee.

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::Address;
use broker_core::{ChainId, RebateSchedule};
use broker_store::{BoxFuture, SharedStore};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{FeeError, FeeResult};
use crate::source::MultiplierSource;

/// Timeout for VIP level requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const VIP_KEY_PREFIX: &str = "VIP";

/// Percent fee reductions per VIP level, by chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VipReductions {
    by_chain: HashMap<ChainId, Vec<u8>>,
}

impl VipReductions {
    /// Parse `"chainId:p1,p2,...;chainId:..."`. An empty string yields no reductions.
    pub fn parse(raw: &str) -> FeeResult<Self> {
        let mut by_chain = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (chain, percents) = entry.split_once(':').ok_or_else(|| {
                FeeError::InvalidReductions(format!(
                    "'{entry}' must look like chainId:p1,p2,... e.g. 1101:70,70,70,70"
                ))
            })?;
            let chain_id: ChainId = chain.trim().parse().map_err(|_| {
                FeeError::InvalidReductions(format!("invalid chain id '{chain}'"))
            })?;
            let percents = percents
                .split(',')
                .map(|p| match p.trim().parse::<u8>() {
                    Ok(p) if p <= 100 => Ok(p),
                    _ => Err(FeeError::InvalidReductions(format!(
                        "invalid percentage '{p}' for chain {chain_id}"
                    ))),
                })
                .collect::<FeeResult<Vec<_>>>()?;
            by_chain.insert(chain_id, percents);
        }
        Ok(Self { by_chain })
    }

    pub fn is_empty(&self) -> bool {
        self.by_chain.is_empty()
    }

    /// Multiplier for `level` on `chain_id`.
    pub fn multiplier(&self, chain_id: ChainId, level: u32) -> Decimal {
        let Some(percents) = self.by_chain.get(&chain_id) else {
            return Decimal::ONE;
        };
        if level == 0 || percents.is_empty() {
            return Decimal::ONE;
        }
        let idx = (level as usize - 1).min(percents.len() - 1);
        Decimal::from(100 - percents[idx]) / Decimal::ONE_HUNDRED
    }
}

#[derive(Debug, Deserialize)]
struct VipResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: VipData,
}

#[derive(Debug, Default, Deserialize)]
struct VipData {
    #[serde(default)]
    level: u32,
}

/// [`MultiplierSource`] backed by the VIP level endpoint.
pub struct VipLevelSource {
    client: Client,
    url: String,
    store: SharedStore,
    reductions: VipReductions,
    cache_secs: u64,
}

impl VipLevelSource {
    pub fn new(
        url: impl Into<String>,
        store: SharedStore,
        reductions: VipReductions,
        cache_secs: u64,
    ) -> FeeResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeeError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            store,
            reductions,
            cache_secs,
        })
    }

    /// VIP level of `trader`, from the store when cached.
    pub async fn level(&self, trader: Address) -> FeeResult<u32> {
        let trader = trader.to_string().to_lowercase();
        let key = format!("{VIP_KEY_PREFIX}:{trader}");
        if let Some(cached) = self.store.get(&key).await? {
            if let Ok(level) = cached.parse::<u32>() {
                return Ok(level);
            }
            debug!(%key, %cached, "Unparseable cached VIP level, refetching");
        }

        let level = self.fetch_level(&trader).await?;
        self.store
            .set_ex(&key, level.to_string(), self.cache_secs)
            .await?;
        Ok(level)
    }

    async fn fetch_level(&self, trader: &str) -> FeeResult<u32> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("addr", trader)])
            .send()
            .await
            .map_err(|e| FeeError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeeError::HttpClient(format!("HTTP {status}: {body}")));
        }

        let body: VipResponse = response
            .json()
            .await
            .map_err(|e| FeeError::HttpClient(format!("Failed to parse VIP response: {e}")))?;
        info!(code = body.code, level = body.data.level, "Fetched VIP level");
        Ok(body.data.level)
    }
}

impl MultiplierSource for VipLevelSource {
    fn multiplier<'a>(
        &'a self,
        trader: Address,
        chain_id: ChainId,
        _schedule: &'a RebateSchedule,
    ) -> BoxFuture<'a, FeeResult<Decimal>> {
        Box::pin(async move {
            let level = self.level(trader).await?;
            Ok(self.reductions.multiplier(chain_id, level))
        })
    }
}
