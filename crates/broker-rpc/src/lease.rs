//! Distributed RPC lease pool.
//!
//! Store layout per `(chain, kind)`:
//! - `rpc_endpoints:{chain}:{kind}`: set of endpoint URLs
//! - `rpc_priority:{chain}:{kind}`: newline-separated URLs in configured
//!   order, written once by the first replica to register
//! - `rpc_cursor:{chain}:{kind}`: shared round-robin counter
//! - `rpc_lease:{chain}:{kind}:{url}`: lease id, set with NX and a TTL
//!
//! The NX write is the mutual exclusion point: two live leases can never
//! name the same URL, whichever replica issued them. The TTL is the backstop
//! for holders that crash without releasing.

use std::time::Duration;

use broker_core::{ChainId, EndpointKind, RpcEndpointSet};
use broker_store::SharedStore;
use broker_telemetry::Metrics;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LeaseError, LeaseResult};

/// Order in which endpoints are probed for a free slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Start after the endpoint handed out last, across all replicas.
    #[default]
    RoundRobin,
    /// Always start from the first endpoint in configured order.
    FirstAvailable,
}

/// Behaviour when every endpoint is leased.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Return `PoolExhausted` immediately.
    #[default]
    FailFast,
    /// Poll until a lease frees or `max_wait_ms` elapses, then `PoolExhausted`.
    Block {
        max_wait_ms: u64,
        poll_interval_ms: u64,
    },
}

fn default_lease_secs() -> u64 {
    10
}

/// Lease pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    /// Lease lifetime used when the caller does not pass one.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub exhaustion: ExhaustionPolicy,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            selection: SelectionPolicy::default(),
            exhaustion: ExhaustionPolicy::default(),
        }
    }
}

/// Exclusive, time-bounded right to use one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub url: String,
    pub chain_id: ChainId,
    pub kind: EndpointKind,
    pub lease_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Cross-process allocator over registered RPC endpoints.
pub struct RpcLeasePool {
    store: SharedStore,
    config: LeaseConfig,
}

impl RpcLeasePool {
    pub fn new(store: SharedStore, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    fn endpoints_key(chain_id: ChainId, kind: EndpointKind) -> String {
        format!("rpc_endpoints:{chain_id}:{kind}")
    }

    fn priority_key(chain_id: ChainId, kind: EndpointKind) -> String {
        format!("rpc_priority:{chain_id}:{kind}")
    }

    fn cursor_key(chain_id: ChainId, kind: EndpointKind) -> String {
        format!("rpc_cursor:{chain_id}:{kind}")
    }

    fn lease_key(chain_id: ChainId, kind: EndpointKind, url: &str) -> String {
        format!("rpc_lease:{chain_id}:{kind}:{url}")
    }

    /// Register an endpoint set. Re-registering adds nothing and leaves leases alone.
    pub async fn register_endpoints(&self, set: &RpcEndpointSet) -> LeaseResult<usize> {
        let added = self
            .store
            .set_add(&Self::endpoints_key(set.chain_id, set.kind), set.urls.clone())
            .await?;
        self.store
            .set_nx(
                &Self::priority_key(set.chain_id, set.kind),
                set.urls.join("\n"),
            )
            .await?;
        info!(
            chain_id = set.chain_id,
            kind = %set.kind,
            total = set.urls.len(),
            added,
            "RPC endpoints registered"
        );
        Ok(added)
    }

    /// Lease an endpoint with the configured lifetime.
    pub async fn acquire_default(
        &self,
        chain_id: ChainId,
        kind: EndpointKind,
    ) -> LeaseResult<Receipt> {
        self.acquire(chain_id, kind, self.config.lease_secs).await
    }

    /// Lease an endpoint for `lease_secs`, applying the exhaustion policy.
    pub async fn acquire(
        &self,
        chain_id: ChainId,
        kind: EndpointKind,
        lease_secs: u64,
    ) -> LeaseResult<Receipt> {
        let started = Instant::now();
        loop {
            if let Some(receipt) = self.try_acquire(chain_id, kind, lease_secs).await? {
                Metrics::lease_acquired(chain_id, kind.as_str());
                return Ok(receipt);
            }

            match self.config.exhaustion {
                ExhaustionPolicy::FailFast => {}
                ExhaustionPolicy::Block {
                    max_wait_ms,
                    poll_interval_ms,
                } => {
                    let poll = Duration::from_millis(poll_interval_ms.max(1));
                    if started.elapsed() + poll <= Duration::from_millis(max_wait_ms) {
                        tokio::time::sleep(poll).await;
                        continue;
                    }
                }
            }

            Metrics::lease_exhausted(chain_id, kind.as_str());
            warn!(chain_id, kind = %kind, "RPC lease pool exhausted");
            return Err(LeaseError::PoolExhausted { chain_id, kind });
        }
    }

    /// One pass over the endpoints. `None` when every endpoint is leased.
    pub async fn try_acquire(
        &self,
        chain_id: ChainId,
        kind: EndpointKind,
        lease_secs: u64,
    ) -> LeaseResult<Option<Receipt>> {
        if lease_secs == 0 {
            return Err(LeaseError::InvalidLeaseSecs { chain_id, kind });
        }
        let urls = self.endpoints(chain_id, kind).await?;
        if urls.is_empty() {
            return Err(LeaseError::NoEndpoints { chain_id, kind });
        }

        let start = match self.config.selection {
            SelectionPolicy::RoundRobin => {
                let ticket = self.store.incr(&Self::cursor_key(chain_id, kind)).await?;
                (ticket.rem_euclid(urls.len() as i64)) as usize
            }
            SelectionPolicy::FirstAvailable => 0,
        };

        let lease_id = Uuid::new_v4();
        for offset in 0..urls.len() {
            let url = &urls[(start + offset) % urls.len()];
            let acquired = self
                .store
                .set_nx_ex(
                    &Self::lease_key(chain_id, kind, url),
                    lease_id.to_string(),
                    lease_secs,
                )
                .await?;
            if acquired {
                debug!(chain_id, kind = %kind, lease_id = %lease_id, lease_secs, "RPC lease acquired");
                return Ok(Some(Receipt {
                    url: url.clone(),
                    chain_id,
                    kind,
                    lease_id,
                    expires_at: Utc::now() + chrono::Duration::seconds(lease_secs as i64),
                }));
            }
        }
        Ok(None)
    }

    /// Registered endpoints, configured order first, then any registered later.
    async fn endpoints(&self, chain_id: ChainId, kind: EndpointKind) -> LeaseResult<Vec<String>> {
        let mut members = self
            .store
            .set_members(&Self::endpoints_key(chain_id, kind))
            .await?;
        let priority = self
            .store
            .get(&Self::priority_key(chain_id, kind))
            .await?
            .unwrap_or_default();

        let mut ordered = Vec::with_capacity(members.len());
        for url in priority.lines() {
            if let Some(pos) = members.iter().position(|m| m == url) {
                ordered.push(members.remove(pos));
            }
        }
        ordered.extend(members);
        Ok(ordered)
    }

    /// Give a lease back early.
    ///
    /// Returns whether the lease was still live. Releasing an expired or
    /// already released receipt is a no-op and never frees another holder's lease.
    pub async fn release(&self, receipt: &Receipt) -> LeaseResult<bool> {
        let live = self
            .store
            .delete_if_eq(
                &Self::lease_key(receipt.chain_id, receipt.kind, &receipt.url),
                &receipt.lease_id.to_string(),
            )
            .await?;
        Metrics::lease_released(live);
        debug!(
            chain_id = receipt.chain_id,
            kind = %receipt.kind,
            lease_id = %receipt.lease_id,
            live,
            "RPC lease released"
        );
        Ok(live)
    }
}
