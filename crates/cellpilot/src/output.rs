//! Terminal output utilities

use std::fmt::Display;
use std::time::Duration;

use cellpilot_core::retry::{AttemptRecord, RetryObserver};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Create a spinner advanced by progress callbacks
///
/// There is no background ticker: the spinner only moves when the loop
/// thread reports progress, so a stalled loop shows as a frozen spinner.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let spinner_style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb
}

/// Spinner text for an operation that has been running for `elapsed`
pub fn progress_message(task: &str, elapsed: Duration) -> String {
    format!("Running {} ({:.1}s)", task, elapsed.as_secs_f64())
}

/// Echoes retry notices to the terminal
///
/// Notices are printed above the spinner; with a hidden spinner they go
/// straight to stderr.
pub struct ConsoleObserver {
    spinner: ProgressBar,
}

impl ConsoleObserver {
    pub fn new(spinner: ProgressBar) -> Self {
        Self { spinner }
    }

    fn emit(&self, line: String) {
        if self.spinner.is_hidden() {
            eprintln!("{}", line);
        } else {
            self.spinner.println(line);
        }
    }
}

impl RetryObserver for ConsoleObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {}

    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
        self.emit(format!(
            "{} {}",
            style("RETRY LOG:").yellow().bold(),
            record.describe(operation)
        ));
    }

    fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Display) {
        self.emit(format!(
            "{} '{}' gave up after {} attempts: {}",
            style("RETRY LOG:").red().bold(),
            operation,
            attempts,
            final_error
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message_shows_tenths() {
        assert_eq!(
            progress_message("stocks", Duration::from_millis(1300)),
            "Running stocks (1.3s)"
        );
    }

    #[test]
    fn test_console_observer_tolerates_hidden_spinner() {
        let observer = ConsoleObserver::new(ProgressBar::hidden());
        let record = AttemptRecord {
            attempt_index: 1,
            failure_kind: "WorkbookError".to_string(),
            failure_message: "call was rejected by callee".to_string(),
            computed_delay: Duration::from_millis(1050),
            attempts_remaining: 2,
        };

        observer.on_retry_scheduled("stocks", &record);
        observer.on_exhausted("stocks", 3, &"call was rejected by callee");
    }
}
