//! In-process coordination store.
//!
//! Expiry is evaluated lazily against `tokio::time::Instant`, so paused-time
//! tests can advance past a TTL without sleeping. Pub/sub uses one
//! `tokio::sync::broadcast` channel per channel name.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::stream;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::store::{BoxFuture, CoordinationStore, MessageStream};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn expiring(value: Value, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Single-process [`CoordinationStore`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    /// Snapshot of a live slot, purging it if it has expired.
    fn live(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        self.entries.get(key).map(|slot| slot.clone())
    }

    /// Run `f` against the live slot for `key`, creating it with `init` when absent.
    fn upsert<R>(
        &self,
        key: &str,
        init: impl FnOnce() -> Slot,
        f: impl FnOnce(&mut Slot) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.insert(init());
                }
                f(occupied.get_mut())
            }
            Entry::Vacant(vacant) => {
                let mut slot = vacant.insert(init());
                f(slot.value_mut())
            }
        }
    }

    fn hash_get_all_sync(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        match self.live(key) {
            None => Ok(HashMap::new()),
            Some(Slot {
                value: Value::Hash(map),
                ..
            }) => Ok(map),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn get_sync(&self, key: &str) -> StoreResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn set_nx_sync(&self, key: &str, slot: Slot) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(slot);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                true
            }
        }
    }

    fn delete_if_eq_sync(&self, key: &str, expected: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove_if(key, |_, slot| {
                slot.is_live(now) && matches!(&slot.value, Value::Str(s) if s == expected)
            })
            .is_some()
    }

    fn set_add_sync(&self, key: &str, members: Vec<String>) -> StoreResult<usize> {
        self.upsert(
            key,
            || Slot::persistent(Value::Set(BTreeSet::new())),
            |slot| match &mut slot.value {
                Value::Set(set) => Ok(members.into_iter().filter(|m| set.insert(m.clone())).count()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        )
    }

    fn set_members_sync(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.live(key) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.into_iter().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn incr_sync(&self, key: &str) -> StoreResult<i64> {
        self.upsert(
            key,
            || Slot::persistent(Value::Str("0".to_string())),
            |slot| match &mut slot.value {
                Value::Str(s) => {
                    let current: i64 = s.parse().map_err(|_| StoreError::NotAnInteger {
                        key: key.to_string(),
                        value: s.clone(),
                    })?;
                    let next = current.saturating_add(1);
                    *s = next.to_string();
                    Ok(next)
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        )
    }

    fn list_push_sync(&self, key: &str, value: String) -> StoreResult<()> {
        self.upsert(
            key,
            || Slot::persistent(Value::List(VecDeque::new())),
            |slot| match &mut slot.value {
                Value::List(list) => {
                    list.push_front(value);
                    Ok(())
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        )
    }

    fn list_pop_sync(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let popped = match self.entries.get_mut(key) {
            None => return Ok(None),
            Some(mut slot) => {
                if !slot.is_live(now) {
                    None
                } else {
                    match &mut slot.value {
                        Value::List(list) => list.pop_back(),
                        _ => return Err(StoreError::WrongType(key.to_string())),
                    }
                }
            }
        };
        // Empty lists disappear, as in Redis.
        self.entries.remove_if(key, |_, slot| {
            !slot.is_live(now) || matches!(&slot.value, Value::List(l) if l.is_empty())
        });
        Ok(popped)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl CoordinationStore for MemoryStore {
    fn hash_set_ex<'a>(
        &'a self,
        key: &'a str,
        fields: Vec<(String, String)>,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let map = fields.into_iter().collect();
            self.entries
                .insert(key.to_string(), Slot::expiring(Value::Hash(map), ttl_secs));
            Ok(())
        })
    }

    fn hash_get_all<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<HashMap<String, String>>> {
        Box::pin(async move { self.hash_get_all_sync(key) })
    }

    fn set_ex<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.entries
                .insert(key.to_string(), Slot::expiring(Value::Str(value), ttl_secs));
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Option<String>>> {
        Box::pin(async move { self.get_sync(key) })
    }

    fn set_nx_ex<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            Ok(self.set_nx_sync(key, Slot::expiring(Value::Str(value), ttl_secs)))
        })
    }

    fn set_nx<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move { Ok(self.set_nx_sync(key, Slot::persistent(Value::Str(value)))) })
    }

    fn delete_if_eq<'a>(
        &'a self,
        key: &'a str,
        expected: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move { Ok(self.delete_if_eq_sync(key, expected)) })
    }

    fn set_add<'a>(
        &'a self,
        key: &'a str,
        members: Vec<String>,
    ) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move { self.set_add_sync(key, members) })
    }

    fn set_members<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Vec<String>>> {
        Box::pin(async move { self.set_members_sync(key) })
    }

    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<i64>> {
        Box::pin(async move { self.incr_sync(key) })
    }

    fn list_push<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.list_push_sync(key, value) })
    }

    fn list_pop<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Option<String>>> {
        Box::pin(async move { self.list_pop_sync(key) })
    }

    fn publish<'a>(
        &'a self,
        channel: &'a str,
        message: String,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            // No receivers is not an error, matching Redis PUBLISH.
            let _ = self.sender(channel).send(message);
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, StoreResult<MessageStream>> {
        Box::pin(async move {
            let rx = self.sender(channel).subscribe();
            let channel = channel.to_string();
            let messages = stream::unfold((rx, channel), |(mut rx, channel)| async move {
                loop {
                    match rx.recv().await {
                        Ok(msg) => return Some((msg, (rx, channel))),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });
            Ok(Box::pin(messages) as MessageStream)
        })
    }
}
