//! Type definitions for cellpilot configuration

mod runtime_config;

pub use runtime_config::*;
