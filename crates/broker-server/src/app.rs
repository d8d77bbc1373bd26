//! Composition root.
//!
//! Every shared component is built here from [`AppConfig`] and handed to
//! its consumers explicitly. Nothing below this module reads global state.

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use broker_api::ApiState;
use broker_core::{ChainRegistry, SystemClock};
use broker_fee::{
    FeeCache, MultiplierSource, MultiplierSourceConfig, TokenRebateSource, VipLevelSource,
    VipReductions,
};
use broker_hub::{HubState, RelayConsumer, SubscriptionHub};
use broker_relay::OrderRelay;
use broker_rpc::{ApprovalGate, LeasedBalanceReader, OnChainApprover, RpcLeasePool, TokenApproval};
use broker_signer::{load_signer, SignaturePen};
use broker_store::{MemoryStore, RedisStore, SharedStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{AppConfig, StoreConfig};
use crate::error::{AppError, AppResult};

/// Components shared by both services.
pub struct Services {
    config: AppConfig,
    registry: Arc<ChainRegistry>,
    store: SharedStore,
    leases: Arc<RpcLeasePool>,
}

impl Services {
    /// Open the configured store and register RPC endpoints.
    pub async fn connect(config: AppConfig) -> AppResult<Self> {
        let store: SharedStore = match &config.store {
            StoreConfig::Memory => {
                warn!("Using the in-process store; replicas will not share state");
                Arc::new(MemoryStore::new())
            }
            StoreConfig::Redis { url } => Arc::new(RedisStore::connect(url).await?),
        };
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: AppConfig, store: SharedStore) -> AppResult<Self> {
        let registry = Arc::new(config.registry()?);
        let leases = Arc::new(RpcLeasePool::new(store.clone(), config.lease.clone()));
        for set in config.endpoint_sets() {
            leases.register_endpoints(&set).await?;
        }
        info!(chains = ?registry.chain_ids(), "Chain registry loaded");
        Ok(Self {
            config,
            registry,
            store,
            leases,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn relay(&self) -> OrderRelay {
        OrderRelay::new(self.store.clone())
    }

    /// Fee cache over the configured multiplier source.
    pub fn fee_cache(&self) -> AppResult<FeeCache> {
        let fee = &self.config.fee;
        let source: Arc<dyn MultiplierSource> = match &fee.source {
            MultiplierSourceConfig::Tokens => {
                let reader = LeasedBalanceReader::new(self.leases.clone(), fee.balance_retry);
                Arc::new(TokenRebateSource::new(Arc::new(reader)))
            }
            MultiplierSourceConfig::Vip {
                url,
                reductions,
                cache_secs,
            } => Arc::new(VipLevelSource::new(
                url.clone(),
                self.store.clone(),
                VipReductions::parse(reductions)?,
                *cache_secs,
            )?),
        };
        Ok(FeeCache::new(
            self.store.clone(),
            source,
            Arc::new(SystemClock),
            fee,
        ))
    }

    /// Broker key from the `[key]` section.
    pub fn load_signer(&self) -> AppResult<PrivateKeySigner> {
        let key = self
            .config
            .key
            .as_ref()
            .ok_or_else(|| AppError::Config("[key] section is required to sign".into()))?;
        let signer = load_signer(&key.source, key.expected_address)?;
        info!(broker = %signer.address(), "Broker key loaded");
        Ok(signer)
    }

    pub fn api_state(&self, signer: PrivateKeySigner) -> AppResult<ApiState> {
        let approval = &self.config.approval;
        let on_chain: Option<Arc<dyn TokenApproval>> = if approval.on_chain {
            Some(Arc::new(OnChainApprover::new(
                self.leases.clone(),
                signer.clone(),
                approval.lease_secs,
            )))
        } else {
            None
        };
        let approvals = Arc::new(ApprovalGate::new(&self.registry, on_chain));
        let pen = Arc::new(SignaturePen::new(self.registry.clone(), signer));
        Ok(ApiState::new(
            pen,
            self.fee_cache()?,
            self.relay(),
            approvals,
            self.config.api.base_fee_tbps,
        ))
    }

    /// WebSocket hub state and the consumer feeding it.
    pub fn hub(&self) -> (HubState, RelayConsumer) {
        let hub = Arc::new(SubscriptionHub::new(
            self.registry.clone(),
            self.config.hub.write_wait(),
        ));
        let consumer = RelayConsumer::new(self.relay(), hub.clone());
        (HubState::new(hub, self.config.hub.clone()), consumer)
    }
}

/// Serve the REST API until `shutdown` is cancelled.
pub async fn run_api(services: Services, shutdown: CancellationToken) -> AppResult<()> {
    let signer = services.load_signer()?;
    let state = services.api_state(signer)?;
    let listener = TcpListener::bind(services.config().api.listen_addr()).await?;
    broker_api::run_server(listener, state, shutdown).await?;
    info!("REST API stopped");
    Ok(())
}

/// Serve the WebSocket hub and its relay consumer until `shutdown` is
/// cancelled.
pub async fn run_executor_ws(services: Services, shutdown: CancellationToken) -> AppResult<()> {
    let (state, consumer) = services.hub();
    let consumer = tokio::spawn(consumer.run(shutdown.clone()));

    let listener = TcpListener::bind(services.config().hub.listen_addr()).await?;
    let served = broker_hub::run_server(listener, state, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = consumer.await {
        warn!(error = %e, "Relay consumer task failed");
    }
    served?;
    info!("WebSocket hub stopped");
    Ok(())
}

/// Token cancelled on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C; shutting down"),
        }
        trigger.cancel();
    });
    token
}
