//! Reter - fleet-safe periodic task scheduler
//!
//! Facade over [`reter_core`] and [`reter_redis`] adding:
//! - Settings: layered configuration (embedded defaults, `config/`, env)
//! - Telemetry: `tracing` subscriber setup
//! - [`connect`]: a Redis-backed [`Scheduler`] built from settings
//!
//! # Example
//!
//! ```ignore
//! let settings = reter::load_settings()?;
//! reter::init_tracing(&settings.telemetry)?;
//!
//! let scheduler = reter::connect(&settings)?;
//! scheduler
//!     .at("03-00")
//!     .run_fn("nightly-backup", || async { backup().await })
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod settings;
pub mod telemetry;

pub use loader::{load_settings, load_settings_from};
pub use reter_core::*;
pub use reter_redis::{RedisCoordinator, RedisSettings};
pub use settings::{CoordinationSettings, SchedulerSettings, Settings, TelemetrySettings};
pub use telemetry::init_tracing;

use anyhow::Context;
use std::sync::Arc;

/// Scheduler builder over the Redis backend described by `settings`
///
/// Use this to plug in a custom logger, clock or shutdown token before
/// building.
pub fn connect_builder(settings: &Settings) -> anyhow::Result<SchedulerBuilder> {
    settings.validate().context("Invalid configuration")?;
    let backend = RedisCoordinator::new(settings.coordination.to_redis_settings())
        .context("Failed to create Redis coordinator")?;

    tracing::info!(
        endpoints = ?backend.endpoints(),
        key_prefix = %settings.coordination.key_prefix,
        "Redis coordination configured"
    );

    Ok(Scheduler::builder(Arc::new(backend)).options(settings.scheduler_options()))
}

/// Redis-backed scheduler built from `settings`
///
/// No connection is made until the first task fires.
pub fn connect(settings: &Settings) -> anyhow::Result<Scheduler> {
    Ok(connect_builder(settings)?.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_builds_without_a_server() {
        let scheduler = connect(&Settings::default()).unwrap();
        assert!(scheduler.registered_tasks().is_empty());
    }

    #[test]
    fn test_connect_rejects_invalid_settings() {
        let mut settings = Settings::default();
        settings.coordination.endpoints = vec!["not-a-url".to_string()];
        let Err(err) = connect(&settings) else {
            panic!("invalid endpoint accepted");
        };
        assert!(format!("{:#}", err).contains("Failed to create Redis coordinator"));

        settings.coordination.endpoints.clear();
        assert!(connect(&settings).is_err());
    }
}
