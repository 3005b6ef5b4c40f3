//! Coordination backend capability
//!
//! The execution gate needs four operations from the shared store that all
//! fleet members talk to: read and write the last-run record of a task, and
//! take and release a TTL-bounded lock keyed by the task name.
//!
//! [`MemoryCoordinator`] implements the contract in-process. The Redis
//! implementation lives in the `reter-redis` crate.

mod memory;

pub use memory::MemoryCoordinator;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a coordination backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// Lock is held by another holder
    #[error("lock already held: {key}")]
    AlreadyLocked {
        /// Lock key
        key: String,
    },

    /// No endpoint could be reached
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected or failed the operation
    #[error("coordination store error: {0}")]
    Backend(String),

    /// Lock expired and was no longer ours at release time
    #[error("lock lost before release: {key}")]
    LockLost {
        /// Lock key
        key: String,
    },

    /// Operation exceeded its time budget
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Budget that was exceeded
        after: Duration,
    },
}

impl CoordinationError {
    /// Whether this is ordinary lock contention rather than a failure
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::AlreadyLocked { .. })
    }
}

/// Result type for coordination operations
pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// Shared key-value store plus distributed lock
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: &str) -> CoordinationResult<()>;

    /// Take the lock for `key`, held for at most `ttl`
    ///
    /// Returns [`CoordinationError::AlreadyLocked`] when another holder owns it.
    async fn acquire_lock(&self, key: &str, ttl: Duration)
        -> CoordinationResult<Box<dyn LockHandle>>;
}

/// An acquired lock
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Key this lock was taken for
    fn key(&self) -> &str;

    /// Release the lock; consumes the handle so it can only happen once
    async fn release(self: Box<Self>) -> CoordinationResult<()>;
}
