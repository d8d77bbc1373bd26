//! Per-connection read loop and keep-alive.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use broker_telemetry::Metrics;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::hub::{ClientId, SubscriptionHub};
use crate::limiter::ConnectionGuard;
use crate::sink::{ClientSink, WsSink};

/// Drive one client connection until it disconnects.
///
/// The connection is `Connected` until a read fails, the idle timeout
/// elapses, the client closes, or a ping or broadcast write fails. It then
/// leaves every topic, the ping task is cancelled and a close frame is sent.
pub async fn serve_connection(
    socket: WebSocket,
    hub: Arc<SubscriptionHub>,
    config: HubConfig,
    _guard: ConnectionGuard,
) {
    let client_id: ClientId = Uuid::new_v4();
    let (sender, mut receiver) = socket.split();
    let sink: Arc<dyn ClientSink> = Arc::new(WsSink::new(sender, config.write_wait()));
    let done = hub.connect(client_id);

    Metrics::ws_client_connected();
    info!(%client_id, "Client connected");

    let pinger = tokio::spawn(ping_loop(
        client_id,
        Arc::clone(&sink),
        Arc::clone(&hub),
        config.clone(),
        done.clone(),
    ));

    let pong_wait = config.pong_wait();
    loop {
        let next = tokio::select! {
            _ = done.cancelled() => break,
            next = tokio::time::timeout(pong_wait, receiver.next()) => next,
        };
        let message = match next {
            Err(_) => {
                debug!(%client_id, "Idle timeout");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(%client_id, error = %e, "WebSocket read error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let text = match &message {
            Message::Text(text) => text.as_str(),
            Message::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if let Some(reply) = hub.handle_request(client_id, &sink, text) {
            let frame = match reply.to_json() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(%client_id, error = %e, "Failed to encode reply");
                    continue;
                }
            };
            if let Err(e) = sink.send_text(frame).await {
                debug!(%client_id, error = %e, "Reply failed");
                break;
            }
        }
    }

    hub.disconnect(client_id);
    let _ = pinger.await;
    if let Err(e) = sink.close().await {
        debug!(%client_id, error = %e, "Close frame not sent");
    }
    Metrics::ws_client_disconnected();
    info!(%client_id, "Client disconnected");
}

async fn ping_loop(
    client_id: ClientId,
    sink: Arc<dyn ClientSink>,
    hub: Arc<SubscriptionHub>,
    config: HubConfig,
    done: CancellationToken,
) {
    let period = config.ping_period();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = done.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = sink.send_ping().await {
                    debug!(%client_id, error = %e, "Ping failed");
                    hub.disconnect(client_id);
                    return;
                }
            }
        }
    }
}
