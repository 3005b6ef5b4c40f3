//! Scheduler: the [`Runner`] that owns a registry and drives task loops
//!
//! Every scheduler instance has its own registry; two schedulers in one
//! process may register the same names and coordinate through a shared
//! backend just like two separate processes would.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::builder::{Every, Runner, ScheduleBuilder};
use crate::clock::{Clock, SystemClock};
use crate::coordination::CoordinationBackend;
use crate::engine::{TriggerEngine, DEFAULT_RETRY_BACKOFF};
use crate::error::Result;
use crate::gate::{ExecutionGate, GateConfig};
use crate::logger::{TaskLogger, TracingLogger};
use crate::registry::TaskRegistry;
use crate::task::TaskDescriptor;

/// Timing knobs of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Bound on every coordination call
    pub request_timeout: Duration,
    /// Lifetime of a lock that is never released
    pub lock_ttl: Duration,
    /// Wait before retrying a failed daily occurrence
    pub retry_backoff: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        let gate = GateConfig::default();
        Self {
            request_timeout: gate.request_timeout,
            lock_ttl: gate.lock_ttl,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl SchedulerOptions {
    /// Create the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coordination request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the lock TTL
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the daily retry backoff
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Fleet-safe periodic task scheduler
pub struct Scheduler {
    registry: TaskRegistry,
    engine: TriggerEngine,
    logger: Arc<dyn TaskLogger>,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Scheduler over `backend` with default logger, clock and options
    pub fn new(backend: Arc<dyn CoordinationBackend>) -> Self {
        SchedulerBuilder::new(backend).build()
    }

    /// Start building a scheduler over `backend`
    pub fn builder(backend: Arc<dyn CoordinationBackend>) -> SchedulerBuilder {
        SchedulerBuilder::new(backend)
    }

    /// Interval of `count` units, e.g. `every(5).minutes()`
    pub fn every(&self, count: u64) -> Every<'_> {
        Every::new(self, count)
    }

    /// Fixed interval trigger
    pub fn interval(&self, period: Duration) -> ScheduleBuilder<'_> {
        ScheduleBuilder::interval(self, period)
    }

    /// Daily trigger at `HH-MM` or `HH-MM-SS` local time
    pub fn at(&self, time: &str) -> ScheduleBuilder<'_> {
        ScheduleBuilder::at(self, time)
    }

    /// Stop every task loop of this scheduler
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled when the scheduler shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether `name` is registered on this scheduler
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Registered task names, sorted
    pub fn registered_tasks(&self) -> Vec<String> {
        self.registry.list()
    }
}

#[async_trait]
impl Runner for Scheduler {
    async fn run(&self, task: TaskDescriptor) -> Result<()> {
        task.validate()?;
        self.registry.register(task.name())?;
        self.logger.debug(task.name(), "task registered");

        self.engine.run(&task).await;
        Ok(())
    }
}

/// Builder for [`Scheduler`]
pub struct SchedulerBuilder {
    backend: Arc<dyn CoordinationBackend>,
    logger: Arc<dyn TaskLogger>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    shutdown: Option<CancellationToken>,
}

impl SchedulerBuilder {
    /// Create a builder with the tracing logger, system clock and default options
    pub fn new(backend: Arc<dyn CoordinationBackend>) -> Self {
        Self {
            backend,
            logger: Arc::new(TracingLogger),
            clock: Arc::new(SystemClock),
            options: SchedulerOptions::default(),
            shutdown: None,
        }
    }

    /// Set the task logger
    pub fn logger(mut self, logger: Arc<dyn TaskLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the options
    pub fn options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    /// Also stop when `parent` is cancelled
    pub fn shutdown_on(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = Some(parent.child_token());
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Scheduler {
        let gate = ExecutionGate::new(
            self.backend,
            self.logger.clone(),
            self.clock,
            GateConfig {
                request_timeout: self.options.request_timeout,
                lock_ttl: self.options.lock_ttl,
            },
        );
        let shutdown = self.shutdown.unwrap_or_default();
        let engine = TriggerEngine::new(
            Arc::new(gate),
            self.logger.clone(),
            shutdown.clone(),
            self.options.retry_backoff,
        );

        Scheduler {
            registry: TaskRegistry::new(),
            engine,
            logger: self.logger,
            shutdown,
        }
    }
}
