//! Lock stores: Redis for cross-instance exclusion, and an in-process map
//! for single-node runs and tests.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};

use crate::ports::{LockStore, LockStoreError};

/// Deletes the key only while it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Longest expiry handed to Redis; it rejects PX values that overflow its
/// signed millisecond clock.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn ttl_millis(ttl: Duration) -> u64 {
    // MAX_TTL in milliseconds fits comfortably in u64.
    ttl.min(MAX_TTL).as_millis().max(1) as u64
}

/// Redis-backed lock store. One multiplexed connection is opened on first use
/// and shared by every clone of the store.
#[derive(Clone)]
pub struct RedisLockStore {
    redis_client: redis::Client,
    connection: Arc<OnceCell<MultiplexedConnection>>,
}

impl RedisLockStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            connection: Arc::new(OnceCell::new()),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, LockStoreError> {
        let conn = self
            .connection
            .get_or_try_init(|| self.redis_client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }
}

impl From<redis::RedisError> for LockStoreError {
    fn from(e: redis::RedisError) -> Self {
        LockStoreError(e.to_string())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        let mut conn = self.connection().await?;
        let ttl_ms = ttl_millis(ttl);

        // SET NX PX sets the value and the expiry in one atomic command.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockStoreError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[derive(Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockStoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                let expires_at = now
                    .checked_add(ttl)
                    .unwrap_or_else(|| now + MAX_TTL);
                entries.insert(key.to_string(), (token.to_string(), expires_at));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockStoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((held, expires_at)) if held == token && *expires_at > Instant::now() => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
