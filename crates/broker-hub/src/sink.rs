//! Outbound half of a client connection.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use broker_store::BoxFuture;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

use crate::error::{HubError, HubResult};

/// Where a client's messages go.
///
/// Every write is bounded by a timeout; an error means the client is gone.
pub trait ClientSink: Send + Sync {
    fn send_text<'a>(&'a self, text: String) -> BoxFuture<'a, HubResult<()>>;

    fn send_ping<'a>(&'a self) -> BoxFuture<'a, HubResult<()>>;

    /// Best-effort close frame before the connection is dropped.
    fn close<'a>(&'a self) -> BoxFuture<'a, HubResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// [`ClientSink`] over an axum WebSocket.
///
/// The ping task and broadcasts write concurrently, so the sink is behind an
/// async mutex.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
    write_wait: Duration,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>, write_wait: Duration) -> Self {
        Self {
            inner: Mutex::new(inner),
            write_wait,
        }
    }

    async fn write(&self, message: Message) -> HubResult<()> {
        let mut sink = self.inner.lock().await;
        match tokio::time::timeout(self.write_wait, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HubError::Send(e.to_string())),
            Err(_) => Err(HubError::Send(format!(
                "write timed out after {:?}",
                self.write_wait
            ))),
        }
    }
}

impl ClientSink for WsSink {
    fn send_text<'a>(&'a self, text: String) -> BoxFuture<'a, HubResult<()>> {
        Box::pin(self.write(Message::Text(text.into())))
    }

    fn send_ping<'a>(&'a self) -> BoxFuture<'a, HubResult<()>> {
        Box::pin(self.write(Message::Ping(Default::default())))
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, HubResult<()>> {
        Box::pin(self.write(Message::Close(None)))
    }
}
