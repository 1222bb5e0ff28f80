//! Cross-process lease lock
//!
//! A lease is a single timestamp per name in storage shared by every process
//! on the device. It is valid until `ttl` after that timestamp. There is no
//! owner identity and no fencing: two processes racing inside one acquire may
//! both succeed. That only costs a duplicate conversation, which is accepted.

use std::time::Duration;

use async_trait::async_trait;

use crate::services::LocalStore;
use crate::Result;

/// Default lease name for the conversation scheduler.
pub const SCHEDULER_LEASE: &str = "reladen:conv-scheduler:lock";

/// Mutual exclusion with a short TTL.
#[async_trait]
pub trait LeaseLock: Send + Sync {
    /// Take the lease if it is free or expired.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<bool>;

    /// Extend a held lease to a fresh TTL.
    async fn refresh(&self, name: &str) -> Result<()>;

    /// Clear the lease so another process may take it.
    async fn release(&self, name: &str) -> Result<()>;
}

/// Lease stored in the local database's key-value table.
#[derive(Clone)]
pub struct KvLeaseLock {
    store: LocalStore,
}

impl KvLeaseLock {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("lease:{name}")
    }
}

#[async_trait]
impl LeaseLock for KvLeaseLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        let now = self.store.now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let key = Self::key(name);

        // Unparsable values count as expired.
        let held_at = self
            .store
            .kv_get(&key)
            .await?
            .and_then(|value| value.parse::<i64>().ok());
        if let Some(held_at) = held_at {
            let age = now.saturating_sub(held_at);
            if age < ttl_ms {
                tracing::debug!("Lease {name} is held (age {age} ms)");
                return Ok(false);
            }
        }

        self.store.kv_set(&key, &now.to_string()).await?;
        Ok(true)
    }

    async fn refresh(&self, name: &str) -> Result<()> {
        let now = self.store.now_millis();
        self.store.kv_set(&Self::key(name), &now.to_string()).await
    }

    async fn release(&self, name: &str) -> Result<()> {
        self.store.kv_delete(&Self::key(name)).await
    }
}
