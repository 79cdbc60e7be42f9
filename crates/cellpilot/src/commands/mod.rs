//! CLI command implementations

pub mod config;
pub mod run;
pub mod tasks;
pub mod version;

use anyhow::Result;
use camino::Utf8Path;
use cellpilot_core::config::ConfigLoader;
use cellpilot_core::types::CellpilotConfig;

/// Resolve configuration from defaults, the global file, `explicit` and the environment
pub(crate) fn load_config(explicit: Option<&Utf8Path>) -> Result<CellpilotConfig> {
    Ok(ConfigLoader::new()?.load(explicit)?)
}
