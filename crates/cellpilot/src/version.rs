//! Build and runtime identity reported by `cellpilot version`

use cellpilot_core::types::RetryPolicy;
use serde::Serialize;

/// What this binary is and how it retries out of the box
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: String,
    /// Version of the linked `cellpilot-core`
    pub core_version: String,
    /// `git describe` of the source tree, when built from a checkout
    pub commit: Option<String>,
    pub build_date: Option<String>,
    /// Retry policy used when no config layer overrides it
    pub retry_defaults: RetryPolicy,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            core_version: cellpilot_core::VERSION.to_string(),
            commit: option_env!("CELLPILOT_GIT_DESCRIBE").map(String::from),
            build_date: option_env!("CELLPILOT_BUILD_DATE").map(String::from),
            retry_defaults: RetryPolicy::default(),
        }
    }

    /// One-line summary, e.g. `cellpilot 0.3.0 (core 0.3.0, v0.3.0-4-g9f2c1ab)`
    pub fn summary(&self) -> String {
        let mut origin = format!("core {}", self.core_version);
        if let Some(commit) = &self.commit {
            origin.push_str(", ");
            origin.push_str(commit);
        }
        format!("cellpilot {} ({})", self.version, origin)
    }

    /// Built-in retry behaviour in the form shown to users
    pub fn retry_summary(&self) -> String {
        let policy = &self.retry_defaults;
        format!(
            "{} attempts, {}ms initial delay, x{} backoff, {:.0}% jitter",
            policy.max_attempts,
            policy.initial_delay_ms,
            policy.backoff_multiplier,
            policy.jitter_fraction * 100.0
        )
    }
}
