//! Shared coordination store for broker replicas.
//!
//! Every piece of cross-process state (staged orders, per-topic queues, the
//! order notification channel, fee records and RPC leases) goes through the
//! [`CoordinationStore`] trait. Two backends are provided:
//! - [`MemoryStore`]: single-process, lazily expiring, used in tests and
//!   single-replica deployments
//! - [`RedisStore`]: the production backend shared by all replicas

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{BoxFuture, CoordinationStore, MessageStream, SharedStore};
