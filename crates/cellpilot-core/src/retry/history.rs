//! Per-attempt records kept while retrying
//!
//! Every qualifying failure that is followed by another attempt produces one
//! `AttemptRecord`. The ordered list is the attempt history that travels with
//! a terminal `RetryError` into failure reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single failed attempt that was followed by a retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttemptRecord {
    /// 1-based index of the attempt that failed
    pub attempt_index: u32,
    /// Short name of the failure type
    pub failure_kind: String,
    /// Display text of the failure
    pub failure_message: String,
    /// Delay slept before the next attempt, jitter included
    #[serde(with = "duration_secs")]
    pub computed_delay: Duration,
    /// Attempts left after this one
    pub attempts_remaining: u32,
}

impl AttemptRecord {
    /// Human-readable notice for the retry decision
    pub fn describe(&self, operation: &str) -> String {
        format!(
            "RETRY ATTEMPT: operation '{}' failed with error: {}: {}\n  Retrying in {:.2} seconds... ({} tries remaining)",
            operation,
            self.failure_kind,
            self.failure_message,
            self.computed_delay.as_secs_f64(),
            self.attempts_remaining
        )
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt {}: {}: {} (retry after {:.2}s, {} remaining)",
            self.attempt_index,
            self.failure_kind,
            self.failure_message,
            self.computed_delay.as_secs_f64(),
            self.attempts_remaining
        )
    }
}

/// Last path segment of a type name, generics stripped
///
/// `cellpilot::workbook::WorkbookError` becomes `WorkbookError`.
pub(crate) fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
