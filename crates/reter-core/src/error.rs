//! Error types for reter-core
//!
//! Definition errors are returned to whoever registers a task. Coordination
//! and gate errors live next to the code that produces them
//! ([`crate::coordination::CoordinationError`], [`crate::gate::GateError`])
//! and never escape a running task loop.

use thiserror::Error;

/// Errors raised while defining or registering a task
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Task name is empty
    #[error("empty task name")]
    EmptyTaskName,

    /// Interval trigger with a zero duration
    #[error("interval must be greater than zero")]
    ZeroInterval,

    /// Time-of-day string does not match `HH-MM[-SS]`
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// A task with this name is already registered on the scheduler
    #[error("not unique task name: {0}")]
    NotUniqueTaskName(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SchedulerError>;
