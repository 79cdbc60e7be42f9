//! Runtime configuration types for operational parameters
//!
//! These types define configuration that controls runtime behavior: the
//! retry policy wrapped around calls into the workbook, the cadence of the
//! execution coordinator, where failure records are written, and the task
//! catalog exposed by the front end.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CellpilotConfig {
    /// Retry policy applied to workbook calls
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Execution coordinator cadence
    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    /// Failure record settings
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Task catalog, keyed by task name
    #[serde(default = "default_tasks")]
    pub tasks: BTreeMap<String, TaskSpec>,
}

impl Default for CellpilotConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            coordinator: CoordinatorSettings::default(),
            reporting: ReportingConfig::default(),
            tasks: default_tasks(),
        }
    }
}

impl CellpilotConfig {
    /// Check every section for out-of-range values
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.coordinator.validate()?;

        if self.reporting.log_dir_name.trim().is_empty() {
            return Err(Error::invalid_config("reporting.log-dir-name must not be empty"));
        }

        for (name, task) in &self.tasks {
            if !(0.0..=1.0).contains(&task.failure_rate) {
                return Err(Error::invalid_config(format!(
                    "task '{}': failure-rate must be within [0, 1], got {}",
                    name, task.failure_rate
                )));
            }
        }

        Ok(())
    }

    /// Look up a task by name (case-insensitive)
    pub fn task(&self, name: &str) -> Result<&TaskSpec> {
        self.tasks
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, spec)| spec)
            .ok_or_else(|| Error::unknown_task(name))
    }
}

/// Retry policy for calls into the external resource
///
/// The delay before retry `n` (1-indexed failed attempt) is
/// `initial_delay * backoff_multiplier^(n-1)`, optionally capped by
/// `max_delay_ms`, plus a uniform jitter in `[0, jitter_fraction * delay]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Total number of calls allowed, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Fraction of the delay added as random jitter
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// Optional cap on the un-jittered delay in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_fraction: default_jitter_fraction(),
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Initial delay as a Duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay cap as a Duration, if configured
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_ms.map(Duration::from_millis)
    }

    /// Reject parameters outside their documented ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(Error::invalid_retry_policy("max-attempts", "must be at least 1"));
        }
        if self.initial_delay_ms == 0 {
            return Err(Error::invalid_retry_policy(
                "initial-delay-ms",
                "must be greater than zero",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_retry_policy(
                "backoff-multiplier",
                format!("must be >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(Error::invalid_retry_policy(
                "jitter-fraction",
                format!("must be within [0, 1], got {}", self.jitter_fraction),
            ));
        }
        if self.max_delay_ms == Some(0) {
            return Err(Error::invalid_retry_policy(
                "max-delay-ms",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter_fraction() -> f64 {
    0.1
}

/// Cadence of the execution coordinator's poll loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorSettings {
    /// Sleep between polls of the outstanding operation
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum spacing between progress callbacks
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Spacing between "still running" log milestones
    #[serde(default = "default_milestone_interval")]
    pub milestone_interval_ms: u64,

    /// Minimum spacing between liveness re-checks while running
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_ms: u64,

    /// Upper bound on joining abandoned workers at shutdown
    #[serde(default = "default_abandon_join_timeout")]
    pub abandon_join_timeout_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            progress_interval_ms: default_progress_interval(),
            milestone_interval_ms: default_milestone_interval(),
            liveness_interval_ms: default_liveness_interval(),
            abandon_join_timeout_ms: default_abandon_join_timeout(),
        }
    }
}

impl CoordinatorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn milestone_interval(&self) -> Duration {
        Duration::from_millis(self.milestone_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn abandon_join_timeout(&self) -> Duration {
        Duration::from_millis(self.abandon_join_timeout_ms)
    }

    /// Reject zero intervals, which would spin the interactive loop
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("poll-interval-ms", self.poll_interval_ms),
            ("progress-interval-ms", self.progress_interval_ms),
            ("milestone-interval-ms", self.milestone_interval_ms),
            ("liveness-interval-ms", self.liveness_interval_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(Error::invalid_config(format!(
                    "coordinator.{} must be greater than zero",
                    field
                )));
            }
        }
        Ok(())
    }
}

fn default_poll_interval() -> u64 {
    100
}
fn default_progress_interval() -> u64 {
    100 // at most ~10 updates per second
}
fn default_milestone_interval() -> u64 {
    2000
}
fn default_liveness_interval() -> u64 {
    100
}
fn default_abandon_join_timeout() -> u64 {
    2000
}

/// Where failure records are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportingConfig {
    /// Name of the directory created next to the workbook
    #[serde(default = "default_log_dir_name")]
    pub log_dir_name: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            log_dir_name: default_log_dir_name(),
        }
    }
}

fn default_log_dir_name() -> String {
    "logs".to_string()
}

/// A named operation the front end can trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaskSpec {
    /// Group the task is listed under
    pub group: String,

    /// Short description shown by `tasks`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// How long one call into the workbook takes
    #[serde(default = "default_task_duration")]
    pub duration_ms: u64,

    /// Probability that a call fails transiently
    #[serde(default)]
    pub failure_rate: f64,
}

impl TaskSpec {
    fn new(group: &str, description: &str, duration_ms: u64, failure_rate: f64) -> Self {
        Self {
            group: group.to_string(),
            description: Some(description.to_string()),
            duration_ms,
            failure_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn default_task_duration() -> u64 {
    1000
}

fn default_tasks() -> BTreeMap<String, TaskSpec> {
    let mut tasks = BTreeMap::new();
    tasks.insert(
        "stocks".to_string(),
        TaskSpec::new("Market", "Refresh stock price sheet", 1500, 0.5),
    );
    tasks.insert(
        "correl".to_string(),
        TaskSpec::new("Market", "Rebuild correlation matrix", 1000, 0.5),
    );
    tasks.insert(
        "risk".to_string(),
        TaskSpec::new("Market", "Recompute risk metrics", 1000, 0.5),
    );
    tasks.insert(
        "perf".to_string(),
        TaskSpec::new("Portfolio", "Portfolio performance sheet", 1500, 0.5),
    );
    tasks.insert(
        "scenario".to_string(),
        TaskSpec::new("Portfolio", "Scenario analysis", 2000, 0.5),
    );
    tasks.insert(
        "optim".to_string(),
        TaskSpec::new("Portfolio", "Allocation optimisation", 2500, 0.5),
    );
    tasks.insert(
        "report".to_string(),
        TaskSpec::new("Portfolio", "Summary report", 3000, 0.5),
    );
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.jitter_fraction, 0.1);
        assert!(policy.max_delay().is_none());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_rejects_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(Error::InvalidRetryPolicy { field, .. }) if field == "max-attempts"
        ));
    }

    #[test]
    fn test_retry_policy_rejects_shrinking_backoff() {
        let policy = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_retry_policy_rejects_jitter_out_of_range() {
        for jitter in [-0.1, 1.5, f64::NAN] {
            let policy = RetryPolicy {
                jitter_fraction: jitter,
                ..RetryPolicy::default()
            };
            assert!(policy.validate().is_err(), "jitter {} accepted", jitter);
        }
    }

    #[test]
    fn test_retry_policy_kebab_case_yaml() {
        let yaml = "max-attempts: 5\ninitial-delay-ms: 250\njitter-fraction: 0.0\n";
        let policy: RetryPolicy = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 250);
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.jitter_fraction, 0.0);
    }

    #[test]
    fn test_coordinator_settings_defaults() {
        let settings = CoordinatorSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.progress_interval(), Duration::from_millis(100));
        assert_eq!(settings.milestone_interval(), Duration::from_secs(2));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_coordinator_settings_reject_zero_poll() {
        let settings = CoordinatorSettings {
            poll_interval_ms: 0,
            ..CoordinatorSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_default_task_catalog() {
        let config: CellpilotConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config.tasks.len(), 7);
        assert_eq!(config.tasks, CellpilotConfig::default().tasks);
        assert_eq!(config.task("Stocks").unwrap().group, "Market");
        assert!(matches!(
            config.task("missing"),
            Err(Error::UnknownTask { .. })
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_task_failure_rate_validated() {
        let yaml = "tasks:\n  broken:\n    group: Misc\n    failure-rate: 2.0\n";
        let config: CellpilotConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
