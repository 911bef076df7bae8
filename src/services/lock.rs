use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::ports::{LockStore, LockStoreError};

const SETTLEMENT_LOCK_PREFIX: &str = "settlement:";

/// Lock key shared by every path that mutates a parent's settlement legs.
pub fn settlement_lock_key(parent_id: Uuid) -> String {
    format!("{}{}", SETTLEMENT_LOCK_PREFIX, parent_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub ttl: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    /// Minutes-long TTL: the critical section calls slow upstream providers.
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            retry_count: 10,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// A held lock. The token proves ownership on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub key: String,
    pub token: String,
    pub ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Timed out acquiring lock {key} after {attempts} attempts")]
    Timeout { key: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] LockStoreError),
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Tries `retry_count` times, sleeping `retry_delay` between attempts.
    pub async fn acquire(&self, key: &str, options: LockOptions) -> Result<Lock, LockError> {
        let attempts = options.retry_count.max(1);
        let token = Uuid::new_v4().to_string();

        for attempt in 1..=attempts {
            if self.store.try_acquire(key, &token, options.ttl).await? {
                tracing::debug!(lock_key = key, attempt, "Lock acquired");
                return Ok(Lock {
                    key: key.to_string(),
                    token,
                    ttl: options.ttl,
                });
            }
            if attempt < attempts {
                sleep(options.retry_delay).await;
            }
        }

        tracing::warn!(lock_key = key, attempts, "Lock acquisition timed out");
        Err(LockError::Timeout {
            key: key.to_string(),
            attempts,
        })
    }

    /// Returns false when the lock had already expired or changed hands.
    pub async fn release(&self, lock: &Lock) -> Result<bool, LockError> {
        let released = self.store.release(&lock.key, &lock.token).await?;
        if !released {
            tracing::warn!(
                lock_key = %lock.key,
                "Lock was no longer held at release; TTL may be too short"
            );
        }
        Ok(released)
    }

    /// Runs `f` while holding `key`. The lock is released on every exit path,
    /// including errors and panics inside `f`.
    pub async fn run_exclusive<F, Fut, T, E>(
        &self,
        key: &str,
        options: LockOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let lock = self.acquire(key, options).await?;

        let outcome = AssertUnwindSafe(f()).catch_unwind().await;

        if let Err(e) = self.release(&lock).await {
            // The TTL bounds how long the key can outlive us.
            tracing::error!(lock_key = key, error = %e, "Failed to release lock");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
