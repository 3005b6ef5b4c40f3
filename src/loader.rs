//! Configuration loading
//!
//! Handles loading settings from embedded defaults, files, and environment.

use crate::settings::Settings;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration (compiled into the library)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Environment variable selecting `config/{name}`
pub const ENV_SELECTOR: &str = "RETER_ENV";

/// Load settings from files, `.env` and the process environment
pub fn load_settings() -> Result<Settings> {
    load_settings_from(None)
}

/// Same as [`load_settings`], with an explicit file layered above the
/// `config/` directory
pub fn load_settings_from(path: Option<&Path>) -> Result<Settings> {
    let _ = dotenvy::dotenv();
    load_with(path, environment())
}

/// `RETER_<SECTION>__<KEY>` variables; endpoint lists are comma separated
fn environment() -> Environment {
    Environment::with_prefix("RETER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("coordination.endpoints")
}

fn load_with(path: Option<&Path>, env: Environment) -> Result<Settings> {
    let mut builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var(ENV_SELECTOR).unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false));

    // 3. Explicit file (must exist when given)
    if let Some(path) = path {
        builder = builder.add_source(File::from(path.to_path_buf()).required(true));
    }

    // 4. Environment variables (highest priority)
    let settings: Settings = builder
        .add_source(env)
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}
