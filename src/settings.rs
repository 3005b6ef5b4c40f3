//! Configuration types
//!
//! Mirrors `config/default.toml`. Every field has a default so partial files
//! and environment overrides deserialize cleanly.

use anyhow::{bail, Result};
use reter_core::SchedulerOptions;
use reter_redis::RedisSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Coordination backend
    #[serde(default)]
    pub coordination: CoordinationSettings,
    /// Scheduler timing
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Logging
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Coordination backend settings (`[coordination]`)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationSettings {
    /// Redis endpoint URLs, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Prefix for every key written by the scheduler
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Bound on one connection attempt
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    /// Bound on every store or lock call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Lifetime of a lock that is never released
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Log endpoint failures at warn level
    #[serde(default)]
    pub verbose_warnings: bool,
}

fn default_endpoints() -> Vec<String> {
    vec![reter_redis::DEFAULT_ENDPOINT.to_string()]
}

fn default_key_prefix() -> String {
    reter_redis::DEFAULT_KEY_PREFIX.to_string()
}

fn default_dial_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_lock_ttl_secs() -> u64 {
    60
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            key_prefix: default_key_prefix(),
            dial_timeout_secs: default_dial_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            verbose_warnings: false,
        }
    }
}

impl std::fmt::Debug for CoordinationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // RedisSettings redacts endpoint credentials
        f.debug_struct("CoordinationSettings")
            .field("redis", &self.to_redis_settings())
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("lock_ttl_secs", &self.lock_ttl_secs)
            .finish()
    }
}

impl CoordinationSettings {
    /// Connection settings for the Redis backend
    pub fn to_redis_settings(&self) -> RedisSettings {
        RedisSettings::new(self.endpoints.iter().cloned())
            .with_key_prefix(self.key_prefix.clone())
            .with_dial_timeout(Duration::from_secs(self.dial_timeout_secs))
            .with_verbose_warnings(self.verbose_warnings)
    }
}

/// Scheduler settings (`[scheduler]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Wait before retrying a failed daily occurrence
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

fn default_retry_backoff_secs() -> u64 {
    3
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

/// Logging settings (`[telemetry]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "reter=info,reter_core=info,reter_redis=info".to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl Settings {
    /// Check values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<()> {
        let coordination = &self.coordination;
        if coordination.endpoints.is_empty() {
            bail!("coordination.endpoints must list at least one endpoint");
        }
        if let Some(blank) = coordination.endpoints.iter().find(|e| e.trim().is_empty()) {
            bail!("coordination.endpoints contains a blank entry: {:?}", blank);
        }
        for (name, value) in [
            ("coordination.dial_timeout_secs", coordination.dial_timeout_secs),
            ("coordination.request_timeout_secs", coordination.request_timeout_secs),
            ("coordination.lock_ttl_secs", coordination.lock_ttl_secs),
            ("scheduler.retry_backoff_secs", self.scheduler.retry_backoff_secs),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        Ok(())
    }

    /// Scheduler timing derived from these settings
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions::new()
            .with_request_timeout(Duration::from_secs(self.coordination.request_timeout_secs))
            .with_lock_ttl(Duration::from_secs(self.coordination.lock_ttl_secs))
            .with_retry_backoff(Duration::from_secs(self.scheduler.retry_backoff_secs))
    }
}
