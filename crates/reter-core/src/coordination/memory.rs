//! In-process coordination backend
//!
//! Lock expiry follows the tokio clock, so paused-time tests see TTLs run out
//! exactly like a real store would. Clones share state, which lets several
//! schedulers in one process act as a simulated fleet.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use super::{CoordinationBackend, CoordinationError, CoordinationResult, LockHandle};

struct HeldLock {
    token: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    records: Mutex<HashMap<String, String>>,
    locks: Mutex<HashMap<String, HeldLock>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-memory store and lock table
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
}

impl MemoryCoordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value stored under `key`
    pub fn record(&self, key: &str) -> Option<String> {
        guard(&self.inner.records).get(key).cloned()
    }

    /// Whether a live (unexpired) lock exists for `key`
    pub fn is_locked(&self, key: &str) -> bool {
        guard(&self.inner.locks)
            .get(key)
            .is_some_and(|held| held.expires_at > Instant::now())
    }
}

#[async_trait]
impl CoordinationBackend for MemoryCoordinator {
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        Ok(self.record(key))
    }

    async fn put(&self, key: &str, value: &str) -> CoordinationResult<()> {
        guard(&self.inner.records).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> CoordinationResult<Box<dyn LockHandle>> {
        let now = Instant::now();
        let mut locks = guard(&self.inner.locks);

        if locks.get(key).is_some_and(|held| held.expires_at > now) {
            return Err(CoordinationError::AlreadyLocked {
                key: key.to_string(),
            });
        }

        let token = Uuid::new_v4();
        locks.insert(
            key.to_string(),
            HeldLock {
                token,
                expires_at: now + ttl,
            },
        );
        trace!(key = %key, token = %token, "memory lock acquired");

        Ok(Box::new(MemoryLock {
            key: key.to_string(),
            token,
            inner: self.inner.clone(),
        }))
    }
}

struct MemoryLock {
    key: String,
    token: Uuid,
    inner: Arc<Inner>,
}

#[async_trait]
impl LockHandle for MemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self: Box<Self>) -> CoordinationResult<()> {
        let mut locks = guard(&self.inner.locks);
        match locks.get(&self.key) {
            Some(held) if held.token == self.token => {
                let expired = held.expires_at <= Instant::now();
                locks.remove(&self.key);
                if expired {
                    return Err(CoordinationError::LockLost {
                        key: self.key.clone(),
                    });
                }
                Ok(())
            }
            _ => Err(CoordinationError::LockLost {
                key: self.key.clone(),
            }),
        }
    }
}
