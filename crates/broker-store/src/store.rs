//! Coordination store trait.
//!
//! The operation set mirrors the handful of Redis primitives the broker
//! relies on. Every write that carries a TTL must make the record invisible
//! once the TTL lapses: reads after expiry behave exactly like reads of a key
//! that never existed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;

use crate::error::StoreResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Messages received on a subscribed channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Arc wrapper for store trait objects.
pub type SharedStore = Arc<dyn CoordinationStore>;

/// Key/value, hash, list, set and pub/sub operations shared across replicas.
pub trait CoordinationStore: Send + Sync {
    /// Replace the hash at `key` with `fields` and expire it after `ttl_secs`.
    fn hash_set_ex<'a>(
        &'a self,
        key: &'a str,
        fields: Vec<(String, String)>,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// All fields of the hash at `key`; empty when absent or expired.
    fn hash_get_all<'a>(&'a self, key: &'a str)
        -> BoxFuture<'a, StoreResult<HashMap<String, String>>>;

    /// Set a string value with an expiry.
    fn set_ex<'a>(&'a self, key: &'a str, value: String, ttl_secs: u64)
        -> BoxFuture<'a, StoreResult<()>>;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Option<String>>>;

    /// Set `key` only if it does not hold a live value. Returns whether it was set.
    fn set_nx_ex<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<bool>>;

    /// Set `key` with no expiry only if it does not hold a live value.
    fn set_nx<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StoreResult<bool>>;

    /// Delete `key` only if it currently holds `expected`. Returns whether it was deleted.
    fn delete_if_eq<'a>(&'a self, key: &'a str, expected: &'a str)
        -> BoxFuture<'a, StoreResult<bool>>;

    /// Add members to the set at `key`. Returns how many were new.
    fn set_add<'a>(&'a self, key: &'a str, members: Vec<String>)
        -> BoxFuture<'a, StoreResult<usize>>;

    /// Members of the set at `key`, sorted.
    fn set_members<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Vec<String>>>;

    /// Atomically increment the integer at `key`, returning the new value.
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<i64>>;

    /// Push onto the head of the list at `key`.
    fn list_push<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StoreResult<()>>;

    /// Pop from the tail of the list at `key`. Paired with `list_push` this is FIFO.
    fn list_pop<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Option<String>>>;

    /// Publish `message` on `channel`. Delivery is best-effort to current subscribers.
    fn publish<'a>(&'a self, channel: &'a str, message: String)
        -> BoxFuture<'a, StoreResult<()>>;

    /// Subscribe to `channel`. Messages published after this resolves are delivered.
    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, StoreResult<MessageStream>>;
}
