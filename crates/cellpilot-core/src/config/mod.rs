//! Configuration loading and management

mod loader;

pub use loader::{generate_default_config, ConfigLoader, CONFIG_FILE_NAME};
