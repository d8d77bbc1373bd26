//! End-to-end tests of the WebSocket hub over a real socket.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use broker_core::{ChainConfig, ChainRegistry, ClientOrder, Topic};
use broker_hub::{
    run_server, HubConfig, HubState, MessageData, RelayConsumer, ServerMessage, SubscriptionHub,
};
use broker_relay::OrderRelay;
use broker_store::MemoryStore;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    url: String,
    hub: Arc<SubscriptionHub>,
    relay: OrderRelay,
    shutdown: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start(config: HubConfig) -> Harness {
    let registry = ChainRegistry::new(vec![ChainConfig {
        chain_id: 1101,
        name: "zkevm".into(),
        multipay_contract: Address::repeat_byte(1),
        proxy_contract: Address::repeat_byte(2),
        allowed_executors: vec![],
        rebate_tokens: vec![],
        approved_tokens: vec![],
    }])
    .unwrap();
    let hub = Arc::new(SubscriptionHub::new(Arc::new(registry), config.write_wait()));
    let relay = OrderRelay::new(Arc::new(MemoryStore::new()));
    let shutdown = CancellationToken::new();

    tokio::spawn(RelayConsumer::new(relay.clone(), hub.clone()).run(shutdown.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = HubState::new(hub.clone(), config);
    tokio::spawn(run_server(listener, state, shutdown.clone()));

    Harness {
        url: format!("ws://{addr}/ws"),
        hub,
        relay,
        shutdown,
    }
}

async fn send_json(client: &mut Client, text: &str) {
    client.send(Message::Text(text.into())).await.unwrap();
}

/// Next text frame as a server message, skipping control frames.
async fn next_message(client: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .expect("read error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn order(deadline: u32) -> ClientOrder {
    ClientOrder {
        perpetual_id: 100_001,
        trader_addr: "0xAAAaAAAaaAAAAaaAaAaAAaAaAaaaaAaaAAaaAaaA".parse().unwrap(),
        deadline,
        amount: "1000".into(),
        limit_price: "0".into(),
        trigger_price: "0".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_subscribe_ack_and_errors() {
    let harness = start(HubConfig::default()).await;
    let (mut client, _) = connect_async(harness.url.as_str()).await.unwrap();

    send_json(&mut client, r#"{"type":"subscribe","topic":"100001:1101"}"#).await;
    assert_eq!(
        next_message(&mut client).await,
        ServerMessage::ack("100001:1101")
    );

    send_json(&mut client, r#"{"type":"subscribe","topic":"100001:1101"}"#).await;
    assert_eq!(
        next_message(&mut client).await.data,
        MessageData::Error {
            error: "client already subscribed".into()
        }
    );

    send_json(&mut client, "not json at all").await;
    send_json(&mut client, r#"{"type":"subscribe","topic":"42:1101"}"#).await;
    assert_eq!(
        next_message(&mut client).await.data,
        MessageData::Error {
            error: "usage: perpetualId:chainId".into()
        }
    );
}

#[tokio::test]
async fn test_every_subscriber_receives_submitted_order() {
    let harness = start(HubConfig::default()).await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        let (mut client, _) = connect_async(harness.url.as_str()).await.unwrap();
        send_json(&mut client, r#"{"type":"subscribe","topic":"100001:1101"}"#).await;
        assert_eq!(
            next_message(&mut client).await,
            ServerMessage::ack("100001:1101")
        );
        clients.push(client);
    }
    assert_eq!(harness.hub.subscriber_count(&Topic::new(100_001, 1101)), 3);

    let deadline = 1_900_000_000;
    // The consumer subscribes asynchronously; retry until it is listening.
    let mut received = None;
    for _ in 0..50 {
        harness.relay.stage(&order(deadline), "feed", 1101).await.unwrap();
        harness.relay.mark_submitted(&["0xfeed"]).await.unwrap();
        match tokio::time::timeout(Duration::from_millis(100), next_message(&mut clients[0])).await
        {
            Ok(message) => {
                received = Some(message);
                break;
            }
            Err(_) => continue,
        }
    }
    let first = received.expect("no update received");
    assert_eq!(first.kind, "update");
    assert_eq!(first.topic, "100001:1101");
    let MessageData::Update(update) = first.data else {
        panic!("expected an order update");
    };
    assert_eq!(update.order_id, "feed");
    assert_eq!(update.deadline, deadline);
    assert_eq!(
        update.trader_addr,
        "0xAAAaAAAaaAAAAaaAaAaAAaAaAaaaaAaaAAaaAaaA"
    );

    for client in clients.iter_mut().skip(1) {
        let message = next_message(client).await;
        assert!(matches!(message.data, MessageData::Update(ref u) if u.order_id == "feed"));
    }
}

#[tokio::test]
async fn test_unsubscribed_client_gets_nothing() {
    let harness = start(HubConfig::default()).await;
    let (mut client, _) = connect_async(harness.url.as_str()).await.unwrap();
    send_json(&mut client, r#"{"type":"subscribe","topic":"100001:1101"}"#).await;
    next_message(&mut client).await;
    send_json(&mut client, r#"{"type":"unsubscribe","topic":"100001:1101"}"#).await;

    let topic = Topic::new(100_001, 1101);
    for _ in 0..50 {
        if harness.hub.subscriber_count(&topic) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.hub.subscriber_count(&topic), 0);
}

#[tokio::test]
async fn test_disconnect_removes_client_from_all_topics() {
    let harness = start(HubConfig::default()).await;
    let (mut client, _) = connect_async(harness.url.as_str()).await.unwrap();
    for topic in ["100001:1101", "100002:1101"] {
        send_json(
            &mut client,
            &format!(r#"{{"type":"subscribe","topic":"{topic}"}}"#),
        )
        .await;
        next_message(&mut client).await;
    }
    assert_eq!(harness.hub.subscription_count(), 2);

    client.close(None).await.unwrap();
    for _ in 0..100 {
        if harness.hub.subscription_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.hub.subscription_count(), 0);
    assert!(harness.hub.client_ids().is_empty());
}

#[tokio::test]
async fn test_silent_client_is_dropped_after_idle_timeout() {
    let config = HubConfig {
        pong_wait_secs: 1,
        ..HubConfig::default()
    };
    let harness = start(config).await;
    let (mut client, _) = connect_async(harness.url.as_str()).await.unwrap();
    send_json(&mut client, r#"{"type":"subscribe","topic":"100001:1101"}"#).await;
    next_message(&mut client).await;

    // Stop reading: pings go unanswered and the idle timeout fires.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(harness.hub.subscription_count(), 0);
}

#[tokio::test]
async fn test_client_that_stops_reading_is_closed_after_write_timeout() {
    let config = HubConfig {
        write_wait_secs: 1,
        ..HubConfig::default()
    };
    let harness = start(config).await;
    let (mut client, _) = connect_async(harness.url.as_str()).await.unwrap();
    send_json(&mut client, r#"{"type":"subscribe","topic":"100001:1101"}"#).await;
    next_message(&mut client).await;

    // Wait until the consumer is listening.
    let mut listening = false;
    for _ in 0..50 {
        harness.relay.stage(&order(1_900_000_000), "warm", 1101).await.unwrap();
        harness.relay.mark_submitted(&["warm"]).await.unwrap();
        if tokio::time::timeout(Duration::from_millis(100), next_message(&mut client))
            .await
            .is_ok()
        {
            listening = true;
            break;
        }
    }
    assert!(listening, "consumer never delivered");

    // Far more than the socket buffers hold while the client is not reading.
    let mut big = order(1_900_000_000);
    big.amount = "1".repeat(1 << 20);
    let ids: Vec<String> = (0..32).map(|i| format!("big{i:02}")).collect();
    for id in &ids {
        harness.relay.stage(&big, id, 1101).await.unwrap();
    }
    harness.relay.mark_submitted(&ids[..]).await.unwrap();

    let mut dropped = false;
    for _ in 0..100 {
        if harness.hub.client_ids().is_empty() {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(dropped, "stalled client was not disconnected");
    assert_eq!(harness.hub.subscription_count(), 0);

    // Whatever was buffered drains, then the socket ends.
    loop {
        match tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("socket still open after the client was dropped")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn test_connection_limit_returns_503() {
    let config = HubConfig {
        max_connections: 1,
        ..HubConfig::default()
    };
    let harness = start(config).await;
    let (_first, _) = connect_async(harness.url.as_str()).await.unwrap();

    let err = connect_async(harness.url.as_str()).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 503);
        }
        other => panic!("expected HTTP 503, got {other:?}"),
    }
}
