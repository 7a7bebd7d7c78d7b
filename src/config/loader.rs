use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{debug, info};

use super::EngineConfig;

/// Layered config load: built-in defaults, then an optional TOML file,
/// then CRASHPILOT_* environment overrides. Validated before use; the
/// result is immutable for the life of the process.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&EngineConfig::default())?);

    if let Some(path) = path {
        if path.exists() {
            info!("Loading config from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        } else {
            debug!("Config file {} not found, using defaults", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CRASHPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let config: EngineConfig = builder
        .build()
        .context("failed to assemble configuration")?
        .try_deserialize()
        .context("failed to deserialize configuration")?;

    config
        .validate()
        .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;

    Ok(config)
}
