//! Layered configuration loader
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. Global config (~/.cellpilot/config.yaml)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (CELLPILOT_* prefix)
//! 5. CLI flags (handled by caller)
//!
//! File layers are merged key by key, so a file only needs the values it
//! changes.

use crate::error::{Error, Result};
use crate::types::CellpilotConfig;
use camino::{Utf8Path, Utf8PathBuf};
use serde_yaml_ng::Value;
use std::env;
use std::fs;
use std::str::FromStr;

/// File name of the global config inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration loader
pub struct ConfigLoader {
    /// Directory holding the global config file
    config_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Create a loader rooted at ~/.cellpilot
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::invalid_config("Could not determine home directory"))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|_| Error::invalid_config("Home directory is not valid UTF-8"))?;

        Ok(Self {
            config_dir: home.join(".cellpilot"),
        })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn global_config_path(&self) -> Utf8PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load configuration, layering `explicit` over the global file
    ///
    /// The result is not validated: CLI flags still apply on top.
    pub fn load(&self, explicit: Option<&Utf8Path>) -> Result<CellpilotConfig> {
        let mut merged = serde_yaml_ng::to_value(CellpilotConfig::default())?;

        let global = self.global_config_path();
        if global.is_file() {
            merge_values(&mut merged, load_yaml_value(&global)?);
            tracing::debug!(path = %global, "loaded global config");
        }

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::config_not_found(path.as_str()));
            }
            merge_values(&mut merged, load_yaml_value(path)?);
            tracing::debug!(path = %path, "loaded config file");
        }

        let config: CellpilotConfig = serde_yaml_ng::from_value(merged)
            .map_err(|e| Error::invalid_config(format!("Failed to apply configuration: {}", e)))?;

        apply_env_overrides(config)
    }
}

/// Read a YAML file into an untyped value
fn load_yaml_value(path: &Utf8Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
}

/// Deep-merge `overlay` into `base`; mappings merge, everything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Parse an environment variable if it is set
fn env_override<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} must be a valid number", name))),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides
fn apply_env_overrides(mut config: CellpilotConfig) -> Result<CellpilotConfig> {
    if let Some(val) = env_override("CELLPILOT_MAX_ATTEMPTS")? {
        config.retry.max_attempts = val;
    }

    if let Some(val) = env_override("CELLPILOT_INITIAL_DELAY_MS")? {
        config.retry.initial_delay_ms = val;
    }

    if let Some(val) = env_override("CELLPILOT_BACKOFF_MULTIPLIER")? {
        config.retry.backoff_multiplier = val;
    }

    if let Some(val) = env_override("CELLPILOT_JITTER_FRACTION")? {
        config.retry.jitter_fraction = val;
    }

    if let Some(val) = env_override("CELLPILOT_POLL_INTERVAL_MS")? {
        config.coordinator.poll_interval_ms = val;
    }

    Ok(config)
}

/// Generate the content of a starter config file
pub fn generate_default_config() -> Result<String> {
    let body = serde_yaml_ng::to_string(&CellpilotConfig::default())?;
    Ok(format!(
        "# cellpilot configuration\n\
         # Values here override the built-in defaults; CELLPILOT_* variables override this file.\n\
         {}",
        body
    ))
}
