//! Reter Core - fleet-safe periodic task scheduling
//!
//! Many processes run the same task definitions; a distributed lock plus a
//! shared last-run record make each task fire at most once per period across
//! the whole fleet. This crate provides:
//! - Builder: `every(n).seconds()`, `interval(d)`, `at("HH-MM-SS")`
//! - Registry: per-scheduler task name uniqueness
//! - Engine: interval and daily wall-clock trigger loops
//! - Gate: last-run check, lock, handler, record, release
//! - Coordination: backend capability and an in-memory implementation
//!
//! # Example
//!
//! ```ignore
//! use reter_core::{MemoryCoordinator, Scheduler};
//!
//! let scheduler = Scheduler::new(Arc::new(MemoryCoordinator::new()));
//! scheduler
//!     .every(10)
//!     .seconds()
//!     .run_fn("heartbeat", || async { println!("alive") })
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod clock;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod gate;
pub mod logger;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod time;

pub use builder::{Every, Runner, ScheduleBuilder};
pub use clock::{Clock, SystemClock, TokioClock};
pub use coordination::{
    CoordinationBackend, CoordinationError, CoordinationResult, LockHandle, MemoryCoordinator,
};
pub use engine::{TriggerEngine, DEFAULT_RETRY_BACKOFF};
pub use error::{Result, SchedulerError};
pub use gate::{ExecutionGate, GateConfig, GateError, GateOutcome, RunWindow};
pub use logger::{LogLevel, LogRecord, NoopLogger, TaskLogger, TracingLogger};
pub use registry::TaskRegistry;
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerOptions};
pub use task::{handler_fn, HandlerFuture, TaskDescriptor, TaskHandler, Trigger};
pub use time::TimeOfDay;
