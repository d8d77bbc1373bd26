//! WebSocket subscription hub.
//!
//! Executors connect to `/ws` and subscribe to `perpetualId:chainId` topics.
//! The [`RelayConsumer`] listens for submission notifications, drains the
//! topic queue and hands the updates to the [`SubscriptionHub`], which sends
//! them to every subscriber of the topic concurrently.
//!
//! Each connection runs a read loop with an idle timeout and a ping task at
//! 90% of that timeout. A failed read, ping or send removes the client from
//! every topic.

pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod hub;
pub mod limiter;
pub mod message;
pub mod server;
pub mod sink;

pub use config::HubConfig;
pub use consumer::RelayConsumer;
pub use error::{HubError, HubResult};
pub use hub::{BroadcastReport, ClientId, SubscriptionHub};
pub use limiter::{ConnectionGuard, ConnectionLimiter};
pub use message::{ClientRequest, MessageData, RequestKind, ServerMessage};
pub use server::{create_router, run_server, HubState};
pub use sink::{ClientSink, WsSink};
