//! Task descriptors and trigger definitions
//!
//! A [`TaskDescriptor`] is the immutable unit handed to the trigger engine:
//! a unique name, a [`Trigger`] and an async handler.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SchedulerError};
use crate::time::TimeOfDay;

/// Future returned by a task handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Zero-argument task handler
pub type TaskHandler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Wrap an async closure into a [`TaskHandler`]
pub fn handler_fn<F, Fut>(f: F) -> TaskHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || -> HandlerFuture { Box::pin(f()) })
}

/// When a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every `Duration`, first firing one period after start
    Interval(Duration),
    /// Once a day at a local wall-clock time
    Daily(TimeOfDay),
}

impl Trigger {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Interval(_) => "interval",
            Trigger::Daily(_) => "daily",
        }
    }

    /// Check trigger parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Trigger::Interval(period) if period.is_zero() => Err(SchedulerError::ZeroInterval),
            Trigger::Interval(_) | Trigger::Daily(_) => Ok(()),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval(period) => write!(f, "every {:?}", period),
            Trigger::Daily(at) => write!(f, "daily at {}", at),
        }
    }
}

/// Immutable description of one schedulable task
#[derive(Clone)]
pub struct TaskDescriptor {
    name: String,
    trigger: Trigger,
    handler: TaskHandler,
}

impl TaskDescriptor {
    /// Create a validated descriptor
    pub fn new(name: impl Into<String>, trigger: Trigger, handler: TaskHandler) -> Result<Self> {
        let task = Self {
            name: name.into(),
            trigger,
            handler,
        };
        task.validate()?;
        Ok(task)
    }

    /// Re-check the descriptor invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SchedulerError::EmptyTaskName);
        }
        self.trigger.validate()
    }

    /// Task name (also the lock and last-run key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trigger configuration
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Start one handler invocation
    pub fn invoke(&self) -> HandlerFuture {
        (self.handler)()
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}
