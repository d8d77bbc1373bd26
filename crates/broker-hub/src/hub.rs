//! Topic subscriptions and fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use broker_core::{ChainRegistry, OrderUpdate, Topic};
use broker_telemetry::Metrics;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HubError, HubResult};
use crate::message::{ClientRequest, RequestKind, ServerMessage, TYPE_SUBSCRIBE};
use crate::sink::ClientSink;

/// Identifier assigned to each connection. Never reused.
pub type ClientId = Uuid;

type Subscribers = HashMap<ClientId, Arc<dyn ClientSink>>;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that received every update.
    pub delivered: usize,
    /// Subscribers removed after a failed send.
    pub dropped: usize,
}

/// Topic to subscriber map shared by all connection tasks.
///
/// Topic entries are created on first subscription and kept once empty.
pub struct SubscriptionHub {
    registry: Arc<ChainRegistry>,
    topics: Mutex<HashMap<Topic, Subscribers>>,
    clients: Mutex<HashMap<ClientId, CancellationToken>>,
    write_wait: Duration,
}

impl SubscriptionHub {
    pub fn new(registry: Arc<ChainRegistry>, write_wait: Duration) -> Self {
        Self {
            registry,
            topics: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            write_wait,
        }
    }

    /// Register a live connection. The returned token is cancelled when the
    /// hub drops the client, which tears the connection down.
    pub fn connect(&self, client_id: ClientId) -> CancellationToken {
        let done = CancellationToken::new();
        self.clients.lock().insert(client_id, done.clone());
        done
    }

    /// Remove `client_id` from every topic and signal its connection to close.
    pub fn disconnect(&self, client_id: ClientId) {
        self.remove_client(client_id);
        if let Some(done) = self.clients.lock().remove(&client_id) {
            done.cancel();
        }
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.lock().keys().copied().collect()
    }

    /// Subscribe `client_id` to `raw_topic`.
    ///
    /// The topic must name a perpetual at or above the id floor on a
    /// registered chain. Subscribing twice is an error.
    pub fn subscribe(
        &self,
        client_id: ClientId,
        sink: Arc<dyn ClientSink>,
        raw_topic: &str,
    ) -> HubResult<Topic> {
        let topic = Topic::parse_valid(raw_topic, &self.registry)
            .map_err(|_| HubError::InvalidTopic(raw_topic.to_string()))?;
        let mut topics = self.topics.lock();
        let subscribers = topics.entry(topic).or_default();
        if subscribers.contains_key(&client_id) {
            return Err(HubError::AlreadySubscribed);
        }
        subscribers.insert(client_id, sink);
        debug!(%client_id, %topic, subscribers = subscribers.len(), "Client subscribed");
        Ok(topic)
    }

    /// Remove `client_id` from `raw_topic`. Unknown topics and clients are ignored.
    pub fn unsubscribe(&self, client_id: ClientId, raw_topic: &str) {
        let Ok(topic) = Topic::parse(raw_topic) else {
            return;
        };
        let mut topics = self.topics.lock();
        if let Some(subscribers) = topics.get_mut(&topic) {
            if subscribers.remove(&client_id).is_some() {
                debug!(%client_id, %topic, "Client unsubscribed");
            }
        }
    }

    /// Remove `client_id` from every topic.
    pub fn remove_client(&self, client_id: ClientId) {
        for subscribers in self.topics.lock().values_mut() {
            subscribers.remove(&client_id);
        }
    }

    /// Handle one text frame, returning the reply to send, if any.
    ///
    /// Only subscribe requests are answered. Unparseable frames and other
    /// request types are ignored.
    pub fn handle_request(
        &self,
        client_id: ClientId,
        sink: &Arc<dyn ClientSink>,
        text: &str,
    ) -> Option<ServerMessage> {
        let request = ClientRequest::parse(text)?;
        match request.kind {
            RequestKind::Subscribe => Some(
                match self.subscribe(client_id, Arc::clone(sink), &request.topic) {
                    Ok(topic) => ServerMessage::ack(&topic.to_string()),
                    Err(e) => {
                        debug!(%client_id, topic = %request.topic, error = %e, "Subscribe rejected");
                        ServerMessage::error(TYPE_SUBSCRIBE, &request.topic, e.to_string())
                    }
                },
            ),
            RequestKind::Unsubscribe => {
                self.unsubscribe(client_id, &request.topic);
                None
            }
            RequestKind::Other => None,
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.lock().get(topic).map_or(0, HashMap::len)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    /// Subscriptions across all topics.
    pub fn subscription_count(&self) -> usize {
        self.topics.lock().values().map(HashMap::len).sum()
    }

    pub fn is_subscribed(&self, client_id: ClientId, topic: &Topic) -> bool {
        self.topics
            .lock()
            .get(topic)
            .is_some_and(|s| s.contains_key(&client_id))
    }

    /// Send `updates` to every current subscriber of `topic`.
    ///
    /// Subscribers are written concurrently, each receiving the updates in
    /// order, and the call returns once every write has finished or timed
    /// out. A subscriber whose write fails is disconnected.
    pub async fn broadcast(&self, topic: &Topic, updates: Vec<OrderUpdate>) -> BroadcastReport {
        if updates.is_empty() {
            return BroadcastReport::default();
        }
        let subscribers: Vec<(ClientId, Arc<dyn ClientSink>)> = match self.topics.lock().get(topic)
        {
            Some(subscribers) => subscribers
                .iter()
                .map(|(id, sink)| (*id, Arc::clone(sink)))
                .collect(),
            None => Vec::new(),
        };

        let topic_key = topic.to_string();
        let mut frames = Vec::with_capacity(updates.len());
        for update in updates {
            match ServerMessage::update(&topic_key, update).to_json() {
                Ok(frame) => frames.push(frame),
                Err(e) => warn!(topic = %topic_key, error = %e, "Failed to encode order update"),
            }
        }

        let frames = &frames;
        let results = join_all(subscribers.iter().map(|(client_id, sink)| async move {
            for frame in frames {
                match tokio::time::timeout(self.write_wait, sink.send_text(frame.clone())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err((*client_id, e)),
                    Err(_) => {
                        return Err((
                            *client_id,
                            HubError::Send(format!("write timed out after {:?}", self.write_wait)),
                        ))
                    }
                }
            }
            Ok(())
        }))
        .await;

        let mut report = BroadcastReport::default();
        for result in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err((client_id, e)) => {
                    warn!(%client_id, topic = %topic_key, error = %e, "Dropping client after failed send");
                    self.disconnect(client_id);
                    report.dropped += 1;
                }
            }
        }
        Metrics::broadcast(subscribers.len(), report.dropped);
        info!(
            topic = %topic_key,
            updates = frames.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast order updates"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use broker_core::ChainConfig;
    use broker_store::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        frames: parking_lot::Mutex<Vec<String>>,
        fail: bool,
        stall: bool,
        pings: AtomicUsize,
    }

    impl RecordingSink {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Default::default()
            })
        }

        fn stalled() -> Arc<Self> {
            Arc::new(Self {
                stall: true,
                ..Default::default()
            })
        }
    }

    impl ClientSink for RecordingSink {
        fn send_text<'a>(&'a self, text: String) -> BoxFuture<'a, HubResult<()>> {
            Box::pin(async move {
                if self.stall {
                    std::future::pending::<()>().await;
                }
                if self.fail {
                    return Err(HubError::Send("broken pipe".into()));
                }
                self.frames.lock().push(text);
                Ok(())
            })
        }

        fn send_ping<'a>(&'a self) -> BoxFuture<'a, HubResult<()>> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    fn registry() -> Arc<ChainRegistry> {
        Arc::new(
            ChainRegistry::new(vec![ChainConfig {
                chain_id: 1101,
                name: "zkevm".into(),
                multipay_contract: Address::repeat_byte(1),
                proxy_contract: Address::repeat_byte(2),
                allowed_executors: vec![],
                rebate_tokens: vec![],
                approved_tokens: vec![],
            }])
            .unwrap(),
        )
    }

    fn hub() -> SubscriptionHub {
        SubscriptionHub::new(registry(), Duration::from_secs(10))
    }

    fn update(order_id: &str) -> OrderUpdate {
        OrderUpdate {
            order_id: order_id.into(),
            trader_addr: "0xAAAaAAAaaAAAAaaAaAaAAaAaAaaaaAaaAAaaAaaA".into(),
            deadline: 1_800_000_000,
            flags: 0,
            amount: "1".into(),
            limit_price: "2".into(),
            trigger_price: "0".into(),
            execution_timestamp: 0,
        }
    }

    #[test]
    fn test_subscribe_validates_topic() {
        let hub = hub();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::default());
        let id = Uuid::new_v4();

        assert!(hub.subscribe(id, sink.clone(), "100001:1101").is_ok());
        for bad in ["42:1101", "100001:9999", "abc", "100001:", ":1101", "1e6:1101"] {
            assert!(
                matches!(hub.subscribe(id, sink.clone(), bad), Err(HubError::InvalidTopic(_))),
                "{bad} should be rejected"
            );
        }
        assert_eq!(hub.topic_count(), 1);
    }

    #[test]
    fn test_double_subscribe_is_rejected() {
        let hub = hub();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::default());
        let id = Uuid::new_v4();
        hub.subscribe(id, sink.clone(), "100001:1101").unwrap();
        assert!(matches!(
            hub.subscribe(id, sink, "100001:1101"),
            Err(HubError::AlreadySubscribed)
        ));
        assert_eq!(hub.subscriber_count(&Topic::new(100_001, 1101)), 1);
    }

    #[test]
    fn test_unsubscribe_is_silent() {
        let hub = hub();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::default());
        let id = Uuid::new_v4();
        hub.unsubscribe(id, "100001:1101");
        hub.unsubscribe(id, "garbage");

        hub.subscribe(id, sink, "100001:1101").unwrap();
        hub.unsubscribe(Uuid::new_v4(), "100001:1101");
        assert_eq!(hub.subscriber_count(&Topic::new(100_001, 1101)), 1);
        hub.unsubscribe(id, "100001:1101");
        assert_eq!(hub.subscriber_count(&Topic::new(100_001, 1101)), 0);
        assert_eq!(hub.topic_count(), 1);
    }

    #[test]
    fn test_remove_client_clears_every_topic() {
        let hub = hub();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::default());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        hub.subscribe(a, sink.clone(), "100001:1101").unwrap();
        hub.subscribe(a, sink.clone(), "100002:1101").unwrap();
        hub.subscribe(b, sink, "100002:1101").unwrap();

        hub.remove_client(a);
        assert!(!hub.is_subscribed(a, &Topic::new(100_001, 1101)));
        assert!(!hub.is_subscribed(a, &Topic::new(100_002, 1101)));
        assert!(hub.is_subscribed(b, &Topic::new(100_002, 1101)));
        assert_eq!(hub.subscription_count(), 1);
        assert_eq!(hub.topic_count(), 2);
    }

    #[test]
    fn test_handle_request_replies() {
        let hub = hub();
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::default());
        let id = Uuid::new_v4();

        let ack = hub
            .handle_request(id, &sink, r#"{"type":"Subscribe","topic":"100001:1101"}"#)
            .unwrap();
        assert_eq!(ack, ServerMessage::ack("100001:1101"));

        let again = hub
            .handle_request(id, &sink, r#"{"type":"subscribe","topic":"100001:1101"}"#)
            .unwrap();
        assert_eq!(
            again,
            ServerMessage::error("subscribe", "100001:1101", "client already subscribed")
        );

        let invalid = hub
            .handle_request(id, &sink, r#"{"type":"subscribe","topic":"42:1101"}"#)
            .unwrap();
        assert_eq!(
            invalid,
            ServerMessage::error("subscribe", "42:1101", "usage: perpetualId:chainId")
        );

        assert!(hub
            .handle_request(id, &sink, r#"{"type":"unsubscribe","topic":"100001:1101"}"#)
            .is_none());
        assert!(hub.handle_request(id, &sink, "not json").is_none());
        assert_eq!(hub.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber_in_order() {
        let hub = hub();
        let topic = Topic::new(100_001, 1101);
        let sinks: Vec<Arc<RecordingSink>> =
            (0..5).map(|_| Arc::new(RecordingSink::default())).collect();
        for sink in &sinks {
            hub.subscribe(Uuid::new_v4(), sink.clone(), "100001:1101")
                .unwrap();
        }
        let other = Arc::new(RecordingSink::default());
        hub.subscribe(Uuid::new_v4(), other.clone(), "100002:1101")
            .unwrap();

        let report = hub
            .broadcast(&topic, vec![update("o1"), update("o2")])
            .await;
        assert_eq!(
            report,
            BroadcastReport {
                delivered: 5,
                dropped: 0
            }
        );
        for sink in &sinks {
            let frames = sink.frames.lock();
            assert_eq!(frames.len(), 2);
            assert!(frames[0].contains("\"orderId\":\"o1\""));
            assert!(frames[1].contains("\"orderId\":\"o2\""));
        }
        assert!(other.frames.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscriber_is_removed() {
        let hub = hub();
        let topic = Topic::new(100_001, 1101);
        let good = Arc::new(RecordingSink::default());
        let (good_id, bad_id) = (Uuid::new_v4(), Uuid::new_v4());
        let good_done = hub.connect(good_id);
        let bad_done = hub.connect(bad_id);
        hub.subscribe(good_id, good.clone(), "100001:1101").unwrap();
        hub.subscribe(bad_id, RecordingSink::failing(), "100001:1101")
            .unwrap();
        hub.subscribe(bad_id, RecordingSink::failing(), "100002:1101")
            .unwrap();

        let report = hub.broadcast(&topic, vec![update("o1")]).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(good.frames.lock().len(), 1);
        assert!(!hub.is_subscribed(bad_id, &topic));
        assert!(!hub.is_subscribed(bad_id, &Topic::new(100_002, 1101)));
        assert!(hub.is_subscribed(good_id, &topic));
        assert!(bad_done.is_cancelled());
        assert!(!good_done.is_cancelled());
        assert_eq!(hub.client_ids(), vec![good_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_times_out() {
        let hub = hub();
        let topic = Topic::new(100_001, 1101);
        let good = Arc::new(RecordingSink::default());
        let stalled_id = Uuid::new_v4();
        let stalled_done = hub.connect(stalled_id);
        hub.subscribe(Uuid::new_v4(), good.clone(), "100001:1101")
            .unwrap();
        hub.subscribe(stalled_id, RecordingSink::stalled(), "100001:1101")
            .unwrap();

        let started = tokio::time::Instant::now();
        let report = hub.broadcast(&topic, vec![update("o1")]).await;
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(report.dropped, 1);
        assert_eq!(good.frames.lock().len(), 1);
        assert!(!hub.is_subscribed(stalled_id, &topic));
        assert!(stalled_done.is_cancelled());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let hub = hub();
        let id = Uuid::new_v4();
        let done = hub.connect(id);
        hub.subscribe(id, Arc::new(RecordingSink::default()), "100001:1101")
            .unwrap();

        hub.disconnect(id);
        hub.disconnect(id);
        assert!(done.is_cancelled());
        assert_eq!(hub.subscription_count(), 0);
        assert!(hub.client_ids().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let hub = hub();
        let report = hub
            .broadcast(&Topic::new(100_001, 1101), vec![update("o1")])
            .await;
        assert_eq!(report, BroadcastReport::default());
        let report = hub.broadcast(&Topic::new(100_001, 1101), vec![]).await;
        assert_eq!(report, BroadcastReport::default());
    }
}
