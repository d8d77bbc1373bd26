//! Order relay.
//!
//! Signed orders are staged in the shared store under their order id with a
//! short TTL. When a client reports an order as submitted on chain, its id is
//! queued on the order's topic and the topic key is published on the
//! [`NEW_ORDER_CHANNEL`]. Consumers drain the topic queue and load the staged
//! records themselves, so notifications stay small.

pub mod error;
pub mod relay;

pub use error::{RelayError, RelayResult};
pub use relay::{OrderRelay, TopicStream, NEW_ORDER_CHANNEL, STAGED_ORDER_TTL_SECS};
