//! Failure records for operations that ended in `Failed`
//!
//! A `FailureReport` captures the terminal error, its full cause chain, the
//! captured stack and the retry attempt history. `FileFailureReporter` persists one
//! human-readable, timestamped file per failure in a directory next to the
//! workbook, so the record travels with the resource it concerns.

use chrono::{DateTime, Local};
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::retry::{AttemptRecord, RetryError};

const RULE_WIDTH: usize = 80;

/// Everything needed to write or display one failure record
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub operation: String,
    pub occurred_at: DateTime<Local>,
    /// Error display, every `source()` in the chain, then the panic site and
    /// stack when they were captured
    pub trace: String,
    /// Retry decisions that preceded the terminal failure, oldest first
    pub attempts: Vec<AttemptRecord>,
}

impl FailureReport {
    /// Build a report for a terminal retry failure
    pub fn from_error<E>(operation: impl Into<String>, error: &RetryError<E>) -> Self
    where
        E: StdError + 'static,
    {
        Self {
            operation: operation.into(),
            occurred_at: Local::now(),
            trace: format_failure(error),
            attempts: error.history().to_vec(),
        }
    }

    /// File name embedding the failure timestamp down to microseconds
    pub fn file_name(&self) -> String {
        format!("error_log_{}.txt", self.occurred_at.format("%Y%m%d_%H%M%S_%6f"))
    }

    /// Render the record as written to disk
    pub fn render(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Exception occurred at {}",
            self.occurred_at.format("%Y-%m-%d %H:%M:%S%.6f")
        );
        let _ = writeln!(out, "Operation: {}", self.operation);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "{}", self.trace.trim_end());

        if !self.attempts.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "RETRY ATTEMPTS");
            let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
            for record in &self.attempts {
                let _ = writeln!(
                    out,
                    "{}. {}: {} (retried after {:.2}s)",
                    record.attempt_index,
                    record.failure_kind,
                    record.failure_message,
                    record.computed_delay.as_secs_f64()
                );
            }
        }

        out.push_str(&rule);
        out.push('\n');
        out
    }
}

fn format_failure<E>(error: &RetryError<E>) -> String
where
    E: StdError + 'static,
{
    let mut out = format_trace(error);
    if let Some(location) = error.panic_location() {
        let _ = write!(out, "\n\nPanicked at {}", location);
    }
    if let Some(backtrace) = error.backtrace() {
        let _ = write!(out, "\n\nStack backtrace:\n{}", backtrace);
    }
    out
}

/// Format an error and its cause chain
pub fn format_trace(error: &(dyn StdError + 'static)) -> String {
    let mut out = error.to_string();
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }

    if !causes.is_empty() {
        out.push_str("\n\nCaused by:");
        for (index, cause) in causes.iter().enumerate() {
            let _ = write!(out, "\n    {}: {}", index, cause);
        }
    }
    out
}

/// Persists failure records
pub trait FailureReporter: Send + Sync {
    /// Write the record and return where it was stored
    fn report(&self, report: &FailureReport) -> Result<PathBuf>;
}

/// Writes each failure record to its own file in a log directory
#[derive(Debug, Clone)]
pub struct FileFailureReporter {
    dir: PathBuf,
}

impl FileFailureReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Log directory named `dir_name` in the folder holding `resource`
    pub fn beside(resource: &Path, dir_name: &str) -> Self {
        let parent = resource
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(parent.join(dir_name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, report: &FailureReport) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let base = report.file_name();
        let stem = base.trim_end_matches(".txt");
        let mut candidate = self.dir.join(&base);
        let mut suffix = 1;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut file) => {
                    file.write_all(report.render().as_bytes())?;
                    return Ok(candidate);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = self.dir.join(format!("{}_{}.txt", stem, suffix));
                    suffix += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl FailureReporter for FileFailureReporter {
    fn report(&self, report: &FailureReport) -> Result<PathBuf> {
        match self.write(report) {
            Ok(path) => {
                tracing::info!(
                    operation = %report.operation,
                    path = %path.display(),
                    "failure record written"
                );
                Ok(path)
            }
            Err(err) => {
                tracing::error!(
                    operation = %report.operation,
                    dir = %self.dir.display(),
                    error = %err,
                    "could not persist failure record"
                );
                eprintln!("{}", report.render());
                Err(Error::report_write(self.dir.display().to_string(), err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::backtrace::Backtrace;
    use std::fmt;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Outer(io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "range write failed")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    fn record(index: u32) -> AttemptRecord {
        AttemptRecord {
            attempt_index: index,
            failure_kind: "Outer".to_string(),
            failure_message: "range write failed".to_string(),
            computed_delay: Duration::from_millis(500 * index as u64),
            attempts_remaining: 3 - index,
        }
    }

    fn exhausted() -> RetryError<Outer> {
        RetryError::exhausted(
            3,
            Outer(io::Error::other("call was rejected by callee")),
            vec![record(1), record(2)],
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_trace_includes_cause_chain() {
        let report = FailureReport::from_error("stocks", &exhausted());

        assert!(report.trace.starts_with("retry exhausted after 3 attempts"));
        assert!(report.trace.contains("Caused by:"));
        assert!(report.trace.contains("0: range write failed"));
        assert!(report.trace.contains("1: call was rejected by callee"));
    }

    #[test]
    fn test_trace_includes_panic_site() {
        let err: RetryError<Outer> = RetryError::worker_panicked(
            "range object released",
            Some("src/workbook.rs:88:13".to_string()),
            Some(Backtrace::force_capture()),
        );
        let report = FailureReport::from_error("correl", &err);

        assert!(report.trace.starts_with("worker lost: range object released"));
        assert!(report.trace.contains("Panicked at src/workbook.rs:88:13"));
        assert!(report.trace.contains("Stack backtrace:"));
        assert!(report.render().contains("Panicked at src/workbook.rs:88:13"));
    }

    #[test]
    fn test_trace_without_panic_site_has_no_panic_line() {
        let report = FailureReport::from_error("stocks", &exhausted());
        assert!(!report.trace.contains("Panicked at"));
    }

    #[test]
    fn test_render_lists_retry_attempts() {
        let rendered = FailureReport::from_error("stocks", &exhausted()).render();

        assert!(rendered.starts_with("Exception occurred at "));
        assert!(rendered.contains("Operation: stocks"));
        assert!(rendered.contains("RETRY ATTEMPTS"));
        assert!(rendered.contains("1. Outer: range write failed (retried after 0.50s)"));
        assert!(rendered.contains("2. Outer: range write failed (retried after 1.00s)"));
    }

    #[test]
    fn test_render_omits_empty_attempt_section() {
        let err: RetryError<Outer> = RetryError::single(Outer(io::Error::other("gone")));
        let rendered = FailureReport::from_error("perf", &err).render();

        assert!(!rendered.contains("RETRY ATTEMPTS"));
    }

    #[test]
    fn test_file_name_embeds_timestamp() {
        let report = FailureReport::from_error("stocks", &exhausted());
        let name = report.file_name();

        assert!(name.starts_with("error_log_"));
        assert!(name.ends_with(".txt"));
        // error_log_YYYYmmdd_HHMMSS_ffffff.txt
        assert_eq!(name.len(), "error_log_".len() + 8 + 1 + 6 + 1 + 6 + ".txt".len());
    }

    #[test]
    fn test_beside_places_logs_next_to_workbook() {
        let reporter = FileFailureReporter::beside(Path::new("/data/books/model.xlsm"), "logs");
        assert_eq!(reporter.dir(), Path::new("/data/books/logs"));

        let bare = FileFailureReporter::beside(Path::new("model.xlsm"), "logs");
        assert_eq!(bare.dir(), Path::new("./logs"));
    }

    #[test]
    fn test_reporter_writes_one_file_per_failure() {
        let temp_dir = TempDir::new().unwrap();
        let workbook = temp_dir.path().join("model.xlsm");
        let reporter = FileFailureReporter::beside(&workbook, "logs");
        let report = FailureReport::from_error("stocks", &exhausted());

        let first = reporter.report(&report).unwrap();
        let second = reporter.report(&report).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.parent().unwrap(), temp_dir.path().join("logs"));
        let content = fs::read_to_string(&first).unwrap();
        assert_eq!(content, report.render());
    }

    #[test]
    fn test_reporter_surfaces_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("logs");
        fs::write(&blocker, b"not a directory").unwrap();

        let reporter = FileFailureReporter::new(&blocker);
        let result = reporter.report(&FailureReport::from_error("stocks", &exhausted()));

        assert!(matches!(result, Err(Error::ReportWrite { .. })));
    }
}
