//! Relay notification consumer.

use std::sync::Arc;
use std::time::Duration;

use broker_core::Topic;
use broker_relay::OrderRelay;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HubResult;
use crate::hub::{BroadcastReport, SubscriptionHub};

/// Delay before resubscribing after the notification stream ends.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Feeds submitted orders from the relay into the hub.
pub struct RelayConsumer {
    relay: OrderRelay,
    hub: Arc<SubscriptionHub>,
}

impl RelayConsumer {
    pub fn new(relay: OrderRelay, hub: Arc<SubscriptionHub>) -> Self {
        Self { relay, hub }
    }

    /// Drain `topic` and broadcast what was queued.
    ///
    /// One notification may cover several queued orders, and a later
    /// notification may find the queue already empty.
    pub async fn handle_topic(&self, topic: &Topic) -> HubResult<BroadcastReport> {
        let updates = self.relay.drain(topic).await?;
        if updates.is_empty() {
            debug!(%topic, "Notification with empty queue");
            return Ok(BroadcastReport::default());
        }
        Ok(self.hub.broadcast(topic, updates).await)
    }

    /// Consume notifications until `shutdown` is cancelled, resubscribing
    /// whenever the stream ends or the subscription fails.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Relay consumer started");
        while !shutdown.is_cancelled() {
            match self.relay.notifications().await {
                Ok(mut topics) => loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        next = topics.next() => match next {
                            Some(topic) => {
                                if let Err(e) = self.handle_topic(&topic).await {
                                    warn!(%topic, error = %e, "Failed to relay topic");
                                }
                            }
                            None => {
                                warn!("Notification stream ended");
                                break;
                            }
                        },
                    }
                },
                Err(e) => warn!(error = %e, "Failed to subscribe to notifications"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
        info!("Relay consumer stopped");
    }
}
