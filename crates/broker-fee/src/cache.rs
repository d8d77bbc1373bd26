//! Stale-while-revalidate fee multiplier cache.
//!
//! Records live in the shared store under
//! `trdr_fee_mult:<chainId>:<lowercase trader>` as JSON [`TraderFeeRecord`]s
//! with a hard store expiry. A record older than the soft TTL is still
//! served, and at most one background refresh per key runs in this process.
//! Refreshes overwrite unconditionally, so concurrent writers from other
//! replicas resolve as last-writer-wins.

use std::sync::Arc;

use alloy::primitives::Address;
use broker_core::{apply_multiplier, ChainId, Clock, RebateSchedule, TraderFeeRecord};
use broker_store::SharedStore;
use broker_telemetry::Metrics;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::FeeConfig;
use crate::error::FeeResult;
use crate::source::MultiplierSource;

const FEE_KEY_PREFIX: &str = "trdr_fee_mult";

/// Per-trader fee multiplier cache.
#[derive(Clone)]
pub struct FeeCache {
    store: SharedStore,
    source: Arc<dyn MultiplierSource>,
    clock: Arc<dyn Clock>,
    soft_ttl_secs: u64,
    hard_ttl_secs: u64,
    /// Keys with a background refresh in flight.
    refreshing: Arc<DashMap<String, ()>>,
}

impl FeeCache {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn MultiplierSource>,
        clock: Arc<dyn Clock>,
        config: &FeeConfig,
    ) -> Self {
        Self {
            store,
            source,
            clock,
            soft_ttl_secs: config.soft_ttl_secs,
            hard_ttl_secs: config.hard_ttl_secs,
            refreshing: Arc::new(DashMap::new()),
        }
    }

    /// Store key of a trader's record.
    pub fn key(trader: Address, chain_id: ChainId) -> String {
        format!(
            "{FEE_KEY_PREFIX}:{chain_id}:{}",
            trader.to_string().to_lowercase()
        )
    }

    /// Effective fee of `trader` on `chain_id`, in tenths of a basis point.
    ///
    /// Never fails: a zero trader gets the base fee, and any store or source
    /// error degrades to the base fee without caching anything.
    pub async fn effective_fee(
        &self,
        trader: Address,
        chain_id: ChainId,
        base_fee_tbps: u16,
        schedule: &RebateSchedule,
    ) -> u16 {
        if trader.is_zero() {
            Metrics::fee_cache("default");
            return base_fee_tbps;
        }
        match self.multiplier(trader, chain_id, schedule).await {
            Ok(m) => apply_multiplier(base_fee_tbps, m),
            Err(e) => {
                warn!(
                    chain_id,
                    trader = %short(trader),
                    error = %e,
                    "Fee multiplier unavailable, using base fee"
                );
                Metrics::fee_cache("default");
                base_fee_tbps
            }
        }
    }

    /// Cached multiplier, computing it on a miss and refreshing it in the
    /// background when stale.
    pub async fn multiplier(
        &self,
        trader: Address,
        chain_id: ChainId,
        schedule: &RebateSchedule,
    ) -> FeeResult<Decimal> {
        let key = Self::key(trader, chain_id);
        if let Some(record) = self.load(&key).await? {
            if record.is_stale(self.clock.now_unix(), self.soft_ttl_secs) {
                Metrics::fee_cache("stale");
                self.spawn_refresh(key, trader, chain_id, schedule.clone());
            } else {
                Metrics::fee_cache("hit");
            }
            return Ok(record.multiplier);
        }

        Metrics::fee_cache("miss");
        self.compute_and_store(&key, trader, chain_id, schedule)
            .await
    }

    async fn load(&self, key: &str) -> FeeResult<Option<TraderFeeRecord>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Treated as a miss; the recompute overwrites it.
                warn!(%key, error = %e, "Discarding corrupt fee record");
                Ok(None)
            }
        }
    }

    async fn compute_and_store(
        &self,
        key: &str,
        trader: Address,
        chain_id: ChainId,
        schedule: &RebateSchedule,
    ) -> FeeResult<Decimal> {
        let multiplier = self.source.multiplier(trader, chain_id, schedule).await?;
        let record = TraderFeeRecord::new(
            &trader.to_string(),
            chain_id,
            multiplier,
            self.clock.now_unix(),
        );
        self.store
            .set_ex(key, serde_json::to_string(&record)?, self.hard_ttl_secs)
            .await?;
        debug!(chain_id, trader = %short(trader), %multiplier, "Cached fee multiplier");
        Ok(multiplier)
    }

    fn spawn_refresh(
        &self,
        key: String,
        trader: Address,
        chain_id: ChainId,
        schedule: RebateSchedule,
    ) {
        if self.refreshing.insert(key.clone(), ()).is_some() {
            Metrics::fee_refresh("skipped");
            return;
        }
        info!(chain_id, trader = %short(trader), "Fee multiplier stale, refreshing");
        let cache = self.clone();
        tokio::spawn(async move {
            match cache
                .compute_and_store(&key, trader, chain_id, &schedule)
                .await
            {
                Ok(_) => Metrics::fee_refresh("ok"),
                Err(e) => {
                    warn!(chain_id, trader = %short(trader), error = %e, "Fee refresh failed");
                    Metrics::fee_refresh("error");
                }
            }
            cache.refreshing.remove(&key);
        });
    }
}

/// `0x1234…abcd` form of an address for logs.
fn short(addr: Address) -> String {
    let full = addr.to_string().to_lowercase();
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}
