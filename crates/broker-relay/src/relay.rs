//! Order staging, submission queueing and notifications.

use std::pin::Pin;

use broker_core::{strip_hex_prefix, ChainId, ClientOrder, OrderUpdate, StagedOrder, Topic};
use broker_store::SharedStore;
use broker_telemetry::Metrics;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};

/// Pub/sub channel carrying topic keys of newly submitted orders.
pub const NEW_ORDER_CHANNEL: &str = "new-order";

/// Lifetime of a staged order record.
pub const STAGED_ORDER_TTL_SECS: u64 = 120;

/// Topics announced on [`NEW_ORDER_CHANNEL`].
pub type TopicStream = Pin<Box<dyn Stream<Item = Topic> + Send>>;

/// Stages signed orders and relays submissions to subscribers.
///
/// Store layout:
/// - `<orderId>`: hash of the staged fields, expiring after the TTL
/// - `<perpetualId>:<chainId>`: list of submitted order ids, oldest at the tail
#[derive(Clone)]
pub struct OrderRelay {
    store: SharedStore,
    ttl_secs: u64,
}

impl OrderRelay {
    pub fn new(store: SharedStore) -> Self {
        Self::with_ttl(store, STAGED_ORDER_TTL_SECS)
    }

    pub fn with_ttl(store: SharedStore, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    /// Persist a signed order under `order_id` until the TTL lapses.
    ///
    /// Staging the same id again replaces the record and restarts its TTL.
    pub async fn stage(
        &self,
        order: &ClientOrder,
        order_id: &str,
        chain_id: ChainId,
    ) -> RelayResult<StagedOrder> {
        let order_id = strip_hex_prefix(order_id);
        let staged = StagedOrder::from_order(order, chain_id);
        self.store
            .hash_set_ex(order_id, staged.to_fields(), self.ttl_secs)
            .await?;
        Metrics::relay_event("staged");
        debug!(%order_id, topic = %staged.topic(), "Order staged");
        Ok(staged)
    }

    /// The staged record for `order_id`, or `None` once expired.
    pub async fn load(&self, order_id: &str) -> RelayResult<Option<StagedOrder>> {
        let order_id = strip_hex_prefix(order_id);
        let fields = self.store.hash_get_all(order_id).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        StagedOrder::from_fields(&fields)
            .map(Some)
            .map_err(|e| RelayError::Corrupt {
                order_id: order_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Queue each order on its topic and announce the topic.
    ///
    /// Ids are processed in order and the first unknown or expired id stops
    /// the batch; ids before it stay queued.
    pub async fn mark_submitted<S: AsRef<str>>(&self, order_ids: &[S]) -> RelayResult<()> {
        for raw in order_ids {
            let order_id = strip_hex_prefix(raw.as_ref());
            let Some(staged) = self.load(order_id).await? else {
                Metrics::relay_event("expired");
                warn!(%order_id, "Submitted order not staged");
                return Err(RelayError::OrderExpiredOrUnknown(order_id.to_string()));
            };
            let topic = staged.topic().to_string();
            self.store.list_push(&topic, order_id.to_string()).await?;
            self.store.publish(NEW_ORDER_CHANNEL, topic.clone()).await?;
            Metrics::relay_event("submitted");
            info!(%order_id, %topic, "Order submitted");
        }
        Ok(())
    }

    /// Oldest queued order id for `topic`.
    pub async fn next_pending(&self, topic: &Topic) -> RelayResult<Option<String>> {
        Ok(self.store.list_pop(&topic.to_string()).await?)
    }

    /// Pop every queued id for `topic` and load its update.
    ///
    /// Ids whose staged record has expired are skipped. Updates are returned
    /// in submission order.
    pub async fn drain(&self, topic: &Topic) -> RelayResult<Vec<OrderUpdate>> {
        let mut updates = Vec::new();
        while let Some(order_id) = self.next_pending(topic).await? {
            match self.load(&order_id).await {
                Ok(Some(staged)) => updates.push(staged.into_update(&order_id)),
                Ok(None) => {
                    Metrics::relay_event("expired");
                    warn!(%order_id, %topic, "Queued order expired before broadcast");
                }
                Err(e) => warn!(%order_id, %topic, error = %e, "Skipping queued order"),
            }
        }
        Ok(updates)
    }

    /// Topics announced after this resolves. Malformed payloads are dropped.
    pub async fn notifications(&self) -> RelayResult<TopicStream> {
        let messages = self.store.subscribe(NEW_ORDER_CHANNEL).await?;
        Ok(Box::pin(messages.filter_map(|payload| async move {
            match Topic::parse(&payload) {
                Ok(topic) => Some(topic),
                Err(e) => {
                    warn!(%payload, error = %e, "Ignoring malformed order notification");
                    None
                }
            }
        })))
    }
}
