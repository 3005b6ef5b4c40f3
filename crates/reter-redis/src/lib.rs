//! Reter Redis - Redis coordination backend
//!
//! Implements [`reter_core::CoordinationBackend`] on top of Redis:
//! last-run records are plain string keys, locks use `SET NX PX` with a
//! random token and a compare-and-delete release.
//!
//! # Example
//!
//! ```ignore
//! use reter_redis::{RedisCoordinator, RedisSettings};
//!
//! let backend = RedisCoordinator::new(
//!     RedisSettings::new(["redis://10.0.0.1:6379", "redis://10.0.0.2:6379"])
//!         .with_key_prefix("billing:"),
//! )?;
//! let scheduler = reter_core::Scheduler::new(Arc::new(backend));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod coordinator;
mod settings;

pub use coordinator::RedisCoordinator;
pub use settings::{RedisSettings, DEFAULT_ENDPOINT, DEFAULT_KEY_PREFIX};
