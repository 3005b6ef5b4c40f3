//! Tracing subscriber setup

use crate::settings::TelemetrySettings;
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, falling back to the configured directives
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into())
}

/// Install the global `tracing` subscriber
///
/// # Errors
///
/// Returns error if a global subscriber is already installed
pub fn init_tracing(settings: &TelemetrySettings) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(&settings.filter));

    if settings.json {
        registry
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install tracing subscriber")
    } else {
        registry
            .with(fmt::layer())
            .try_init()
            .context("Failed to install tracing subscriber")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_fails() {
        let settings = TelemetrySettings::default();
        // another test may have installed one already; at most one install succeeds
        let first = init_tracing(&settings);
        let second = init_tracing(&settings);
        assert!(second.is_err());
        if first.is_ok() {
            tracing::info!(task = "telemetry-test", "subscriber installed");
        }
    }
}
