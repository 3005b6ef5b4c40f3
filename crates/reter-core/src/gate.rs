//! Distributed execution gate
//!
//! Turns "a trigger fired in this process" into "the handler runs at most
//! once per period across the fleet":
//!
//! 1. read the shared last-run record; skip if the period is already satisfied
//! 2. take the distributed lock; skip if another member holds it
//! 3. re-read the record under the lock (a member may have finished between 1 and 2)
//! 4. run the handler
//! 5. write the new last-run record
//! 6. release the lock, even when 4 or 5 failed
//!
//! Every backend call is bounded by the request timeout. Contention and
//! "too early" are normal outcomes, never errors. A record that is not a
//! valid timestamp is logged and treated as missing.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::coordination::{CoordinationBackend, CoordinationError, CoordinationResult, LockHandle};
use crate::logger::TaskLogger;
use crate::task::TaskDescriptor;

/// Result of one gate attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Handler ran and the last-run record was updated
    Ran,
    /// Period already satisfied fleet-wide
    SkippedTooEarly,
    /// Another member holds the lock
    SkippedLocked,
}

/// Failure of one gate attempt
#[derive(Debug, Error)]
pub enum GateError {
    /// Last-run record could not be read
    #[error("failed to read last run of {task}: {source}")]
    ReadRecord {
        /// Task name
        task: String,
        /// Backend failure
        #[source]
        source: CoordinationError,
    },

    /// Last-run record is not an RFC3339 timestamp
    #[error("failed to parse last run of {task} ({value:?}): {source}")]
    InvalidRecord {
        /// Task name
        task: String,
        /// Stored value
        value: String,
        /// Parse failure
        #[source]
        source: chrono::ParseError,
    },

    /// Lock acquisition failed for a reason other than contention
    #[error("failed to acquire lock for {task}: {source}")]
    AcquireLock {
        /// Task name
        task: String,
        /// Backend failure
        #[source]
        source: CoordinationError,
    },

    /// Handler panicked
    #[error("handler of {task} panicked: {message}")]
    HandlerPanicked {
        /// Task name
        task: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// New last-run record could not be written
    #[error("failed to write last run of {task}: {source}")]
    WriteRecord {
        /// Task name
        task: String,
        /// Backend failure
        #[source]
        source: CoordinationError,
    },

    /// Lock release failed; the lock will expire through its TTL
    #[error("failed to release lock for {task}: {source}")]
    ReleaseLock {
        /// Task name
        task: String,
        /// Backend failure
        #[source]
        source: CoordinationError,
    },
}

/// What "already ran this period" means for an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunWindow {
    /// Satisfied while less than this much time passed since the last run
    Interval(Duration),
    /// Satisfied once a run completed at or after this instant
    Occurrence(DateTime<Utc>),
}

impl RunWindow {
    /// Whether `last_run` already covers this window at `now`
    ///
    /// A missing record means the task never ran.
    pub fn is_satisfied(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last_run) = last_run else {
            return false;
        };
        match self {
            RunWindow::Interval(period) => match chrono::Duration::from_std(*period) {
                Ok(period) => now.signed_duration_since(last_run) < period,
                Err(_) => true,
            },
            RunWindow::Occurrence(start) => last_run >= *start,
        }
    }
}

/// Format a last-run timestamp for the store (RFC3339, second precision, UTC)
pub fn format_last_run(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored last-run timestamp
pub fn parse_last_run(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|at| at.with_timezone(&Utc))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Lock TTL and per-operation timeout used by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Bound on every backend call
    pub request_timeout: Duration,
    /// How long a taken lock lives if never released
    pub lock_ttl: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            lock_ttl: Duration::from_secs(60),
        }
    }
}

/// Decides whether this process may run a fired task
pub struct ExecutionGate {
    backend: Arc<dyn CoordinationBackend>,
    logger: Arc<dyn TaskLogger>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
}

impl ExecutionGate {
    /// Create a gate over `backend`
    pub fn new(
        backend: Arc<dyn CoordinationBackend>,
        logger: Arc<dyn TaskLogger>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Self {
        Self {
            backend,
            logger,
            clock,
            config,
        }
    }

    /// Gate configuration
    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Clock used for record timestamps
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = CoordinationResult<T>>,
    ) -> CoordinationResult<T> {
        let after = self.config.request_timeout;
        tokio::time::timeout(after, call)
            .await
            .unwrap_or(Err(CoordinationError::Timeout { operation, after }))
    }

    /// Read the last-run record of `task`
    pub async fn last_run(&self, task: &str) -> Result<Option<DateTime<Utc>>, GateError> {
        let value = self
            .bounded("read last run", self.backend.get(task))
            .await
            .map_err(|source| GateError::ReadRecord {
                task: task.to_string(),
                source,
            })?;

        match value {
            None => Ok(None),
            Some(value) => match parse_last_run(&value) {
                Ok(at) => Ok(Some(at)),
                Err(source) => Err(GateError::InvalidRecord {
                    task: task.to_string(),
                    value,
                    source,
                }),
            },
        }
    }

    /// Like [`last_run`](Self::last_run), but an unparsable record counts as
    /// missing so the next run overwrites it
    async fn checked_last_run(&self, task: &str) -> Result<Option<DateTime<Utc>>, GateError> {
        match self.last_run(task).await {
            Ok(last_run) => Ok(last_run),
            Err(err @ GateError::InvalidRecord { .. }) => {
                self.logger.error(task, &err, "parsing last action time");
                Ok(None)
            }
            Err(err) => {
                self.logger.error(task, &err, "getting last action time");
                Err(err)
            }
        }
    }

    async fn record_run(&self, task: &str) -> Result<(), GateError> {
        let value = format_last_run(self.clock.now());
        self.bounded("write last run", self.backend.put(task, &value))
            .await
            .map_err(|source| {
                let err = GateError::WriteRecord {
                    task: task.to_string(),
                    source,
                };
                self.logger.error(task, &err, "setting last action time");
                err
            })
    }

    async fn release(&self, task: &str, lock: Box<dyn LockHandle>) -> Result<(), GateError> {
        match self.bounded("release lock", lock.release()).await {
            Ok(()) => {
                self.logger.debug(task, "lock has been released");
                Ok(())
            }
            Err(source) => {
                let err = GateError::ReleaseLock {
                    task: task.to_string(),
                    source,
                };
                self.logger.error(task, &err, "releasing lock");
                Err(err)
            }
        }
    }

    /// Run `task` if the fleet has not satisfied `window` yet
    pub async fn attempt(
        &self,
        task: &TaskDescriptor,
        window: RunWindow,
    ) -> Result<GateOutcome, GateError> {
        let name = task.name();

        let last_run = self.checked_last_run(name).await?;
        if window.is_satisfied(last_run, self.clock.now()) {
            self.logger.debug(name, "too early");
            return Ok(GateOutcome::SkippedTooEarly);
        }

        let lock = match self
            .bounded(
                "acquire lock",
                self.backend.acquire_lock(name, self.config.lock_ttl),
            )
            .await
        {
            Ok(lock) => lock,
            Err(err) if err.is_contention() => {
                self.logger.debug(name, "already locked");
                return Ok(GateOutcome::SkippedLocked);
            }
            Err(source) => {
                let err = GateError::AcquireLock {
                    task: name.to_string(),
                    source,
                };
                self.logger.error(name, &err, "trying to acquire lock");
                return Err(err);
            }
        };
        self.logger.debug(name, "lock has been acquired");

        match self.checked_last_run(name).await {
            Ok(last_run) if window.is_satisfied(last_run, self.clock.now()) => {
                self.logger.debug(name, "too early, finished while acquiring lock");
                self.release(name, lock).await?;
                return Ok(GateOutcome::SkippedTooEarly);
            }
            Ok(_) => {}
            Err(err) => {
                // release errors are logged inside; the read failure is the one reported
                let _ = self.release(name, lock).await;
                return Err(err);
            }
        }

        // invoke inside the guard: building the future runs user code too
        let recorded = match AssertUnwindSafe(async { task.invoke().await })
            .catch_unwind()
            .await
        {
            Ok(()) => self.record_run(name).await,
            Err(payload) => {
                let err = GateError::HandlerPanicked {
                    task: name.to_string(),
                    message: panic_message(payload.as_ref()),
                };
                self.logger.error(name, &err, "running handler");
                Err(err)
            }
        };

        let released = self.release(name, lock).await;
        recorded?;
        released?;
        Ok(GateOutcome::Ran)
    }
}
