//! Redis-backed coordination store shared by all replicas.

use std::collections::HashMap;

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::store::{BoxFuture, CoordinationStore, MessageStream};

const DELETE_IF_EQ: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// [`CoordinationStore`] over a multiplexed Redis connection.
///
/// Commands share one auto-reconnecting `ConnectionManager`; each
/// subscription opens its own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    delete_if_eq: Script,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://:password@host:6379/`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        info!("Connected to Redis coordination store");
        Ok(Self {
            client,
            conn,
            delete_if_eq: Script::new(DELETE_IF_EQ),
        })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl CoordinationStore for RedisStore {
    fn hash_set_ex<'a>(
        &'a self,
        key: &'a str,
        fields: Vec<(String, String)>,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let _: () = redis::pipe()
                .atomic()
                .cmd("DEL")
                .arg(key)
                .ignore()
                .cmd("HSET")
                .arg(key)
                .arg(&fields)
                .ignore()
                .cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs)
                .ignore()
                .query_async(&mut con)
                .await?;
            Ok(())
        })
    }

    fn hash_get_all<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<HashMap<String, String>>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let map: HashMap<String, String> =
                redis::cmd("HGETALL").arg(key).query_async(&mut con).await?;
            Ok(map)
        })
    }

    fn set_ex<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut con)
                .await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Option<String>>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut con).await?;
            Ok(value)
        })
    }

    fn set_nx_ex<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl_secs: u64,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut con)
                .await?;
            Ok(reply.is_some())
        })
    }

    fn set_nx<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .query_async(&mut con)
                .await?;
            Ok(reply.is_some())
        })
    }

    fn delete_if_eq<'a>(
        &'a self,
        key: &'a str,
        expected: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let deleted: i64 = self
                .delete_if_eq
                .key(key)
                .arg(expected)
                .invoke_async(&mut con)
                .await?;
            Ok(deleted > 0)
        })
    }

    fn set_add<'a>(
        &'a self,
        key: &'a str,
        members: Vec<String>,
    ) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move {
            if members.is_empty() {
                return Ok(0);
            }
            let mut con = self.conn.clone();
            let added: usize = redis::cmd("SADD")
                .arg(key)
                .arg(&members)
                .query_async(&mut con)
                .await?;
            Ok(added)
        })
    }

    fn set_members<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Vec<String>>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let mut members: Vec<String> =
                redis::cmd("SMEMBERS").arg(key).query_async(&mut con).await?;
            members.sort();
            Ok(members)
        })
    }

    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<i64>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut con).await?;
            Ok(value)
        })
    }

    fn list_push<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let _: i64 = redis::cmd("LPUSH")
                .arg(key)
                .arg(value)
                .query_async(&mut con)
                .await?;
            Ok(())
        })
    }

    fn list_pop<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Option<String>>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let value: Option<String> = redis::cmd("RPOP").arg(key).query_async(&mut con).await?;
            Ok(value)
        })
    }

    fn publish<'a>(
        &'a self,
        channel: &'a str,
        message: String,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut con = self.conn.clone();
            let receivers: i64 = redis::cmd("PUBLISH")
                .arg(channel)
                .arg(message)
                .query_async(&mut con)
                .await?;
            debug!(channel, receivers, "Published notification");
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, StoreResult<MessageStream>> {
        Box::pin(async move {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(channel).await?;
            info!(channel, "Subscribed to Redis channel");
            let messages = pubsub
                .into_on_message()
                .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
            Ok(Box::pin(messages) as MessageStream)
        })
    }
}
