//! Configuration loading and schema definitions for devicefarm.
//!
//! This module provides types and functions for loading the run configuration
//! from TOML files or strings. The schema covers the project and device pool
//! to use, device state, the test to run, feature toggles, polling limits and
//! report output.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads devicefarm configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use devicefarm::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("devicefarm.toml"))?;
/// println!("Project: {}", config.devicefarm.project);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads devicefarm configuration from a TOML string.
///
/// # Example
///
/// ```
/// use devicefarm::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [devicefarm]
///     project = "MyProject"
///     device_pool = "Top Devices"
///
///     [test]
///     type = "builtin_fuzz"
/// "#)?;
///
/// assert_eq!(config.devicefarm.device_pool, "Top Devices");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
