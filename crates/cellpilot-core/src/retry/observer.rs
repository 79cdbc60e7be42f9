//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring retry attempts
//! and a `TracingObserver` implementation that logs using the `tracing` crate.
//! Observer callbacks run on the thread executing the retried operation; a
//! panicking observer is contained and never aborts the retry loop.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::history::AttemptRecord;

/// Observer trait for retry attempt events
///
/// Implement this trait to receive callbacks during retry execution.
///
/// # Example
///
/// ```rust
/// use cellpilot_core::retry::{AttemptRecord, RetryObserver};
/// use std::fmt::Display;
/// use std::time::Duration;
///
/// struct StatusLine;
///
/// impl RetryObserver for StatusLine {
///     fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {}
///
///     fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
///         eprintln!("{}", record.describe(operation));
///     }
///
///     fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {}
///
///     fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &dyn Display) {}
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// Called when an attempt is about to start
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32);

    /// Called when a qualifying failure will be retried after `record.computed_delay`
    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord);

    /// Called when the operation succeeds
    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration);

    /// Called when the final attempt fails with a qualifying error
    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Display);

    /// Called when the predicate rejects a failure
    fn on_non_retryable(&self, operation: &str, attempt: u32, error: &dyn Display) {
        let _ = (operation, attempt, error);
    }
}

/// Run an observer callback, containing any panic it raises
pub(crate) fn notify_guarded<F: FnOnce()>(operation: &str, callback: F) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::warn!(operation = %operation, "retry observer panicked; continuing");
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {}

    fn on_retry_scheduled(&self, _operation: &str, _record: &AttemptRecord) {}

    fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &dyn Display) {}
}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_retry_scheduled`: WARN (the full retry notice)
/// - `on_success`: INFO (if > 1 attempt) or DEBUG (first attempt)
/// - `on_exhausted`: ERROR
/// - `on_non_retryable`: WARN
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            operation = %operation,
            attempt = attempt,
            max_attempts = max_attempts,
            "starting attempt"
        );
    }

    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
        tracing::warn!(
            operation = %operation,
            attempt = record.attempt_index,
            remaining = record.attempts_remaining,
            delay_ms = record.computed_delay.as_millis() as u64,
            "{}",
            record.describe(operation)
        );
    }

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %operation,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Display) {
        tracing::error!(
            operation = %operation,
            attempts = attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_non_retryable(&self, operation: &str, attempt: u32, error: &dyn Display) {
        tracing::warn!(
            operation = %operation,
            attempt = attempt,
            error = %error,
            "not retrying non-qualifying error"
        );
    }
}

/// An observer that collects statistics about retry attempts
///
/// Useful for testing and metrics collection.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    retries: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    rejections: AtomicU32,
    notices: Mutex<Vec<String>>,
}

impl StatsObserver {
    /// Create a new stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of attempt starts
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Get the number of scheduled retries
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Get the number of successes
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Get the number of exhaustions
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    /// Get the number of non-retryable rejections
    pub fn rejections(&self) -> u32 {
        self.rejections.load(Ordering::SeqCst)
    }

    /// Retry notices received so far, oldest first
    pub fn notices(&self) -> Vec<String> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(record.describe(operation));
        }
    }

    fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &dyn Display) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_non_retryable(&self, _operation: &str, _attempt: u32, _error: &dyn Display) {
        self.rejections.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fan events out to two observers, e.g. a log sink and a console echo
impl<A: RetryObserver, B: RetryObserver> RetryObserver for (A, B) {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        self.0.on_attempt_start(operation, attempt, max_attempts);
        self.1.on_attempt_start(operation, attempt, max_attempts);
    }

    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
        notify_guarded(operation, || self.0.on_retry_scheduled(operation, record));
        notify_guarded(operation, || self.1.on_retry_scheduled(operation, record));
    }

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration) {
        self.0.on_success(operation, attempt, total_duration);
        self.1.on_success(operation, attempt, total_duration);
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Display) {
        self.0.on_exhausted(operation, attempts, final_error);
        self.1.on_exhausted(operation, attempts, final_error);
    }

    fn on_non_retryable(&self, operation: &str, attempt: u32, error: &dyn Display) {
        self.0.on_non_retryable(operation, attempt, error);
        self.1.on_non_retryable(operation, attempt, error);
    }
}

/// Implement RetryObserver for Arc<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(operation, attempt, max_attempts)
    }

    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
        (**self).on_retry_scheduled(operation, record)
    }

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration) {
        (**self).on_success(operation, attempt, total_duration)
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Display) {
        (**self).on_exhausted(operation, attempts, final_error)
    }

    fn on_non_retryable(&self, operation: &str, attempt: u32, error: &dyn Display) {
        (**self).on_non_retryable(operation, attempt, error)
    }
}

/// Implement RetryObserver for Box<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn on_attempt_start(&self, operation: &str, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(operation, attempt, max_attempts)
    }

    fn on_retry_scheduled(&self, operation: &str, record: &AttemptRecord) {
        (**self).on_retry_scheduled(operation, record)
    }

    fn on_success(&self, operation: &str, attempt: u32, total_duration: Duration) {
        (**self).on_success(operation, attempt, total_duration)
    }

    fn on_exhausted(&self, operation: &str, attempts: u32, final_error: &dyn Display) {
        (**self).on_exhausted(operation, attempts, final_error)
    }

    fn on_non_retryable(&self, operation: &str, attempt: u32, error: &dyn Display) {
        (**self).on_non_retryable(operation, attempt, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(index: u32) -> AttemptRecord {
        AttemptRecord {
            attempt_index: index,
            failure_kind: "Error".to_string(),
            failure_message: "test".to_string(),
            computed_delay: Duration::from_millis(100),
            attempts_remaining: 2,
        }
    }

    #[test]
    fn test_noop_observer() {
        let observer = NoOpObserver;

        observer.on_attempt_start("op", 1, 3);
        observer.on_retry_scheduled("op", &record(1));
        observer.on_success("op", 2, Duration::from_millis(500));
        observer.on_exhausted("op", 3, &"test");
        observer.on_non_retryable("op", 2, &"test");
    }

    #[test]
    fn test_stats_observer() {
        let observer = StatsObserver::new();

        observer.on_attempt_start("op", 1, 3);
        observer.on_retry_scheduled("op", &record(1));
        observer.on_attempt_start("op", 2, 3);
        observer.on_success("op", 2, Duration::from_millis(500));

        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.retries(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.exhaustions(), 0);
        assert_eq!(observer.notices().len(), 1);
        assert!(observer.notices()[0].contains("'op'"));
    }

    #[test]
    fn test_pair_observer_fans_out() {
        let first = Arc::new(StatsObserver::new());
        let second = Arc::new(StatsObserver::new());
        let pair = (first.clone(), second.clone());

        pair.on_retry_scheduled("op", &record(1));
        pair.on_exhausted("op", 3, &"boom");

        assert_eq!(first.retries(), 1);
        assert_eq!(second.retries(), 1);
        assert_eq!(first.exhaustions(), 1);
        assert_eq!(second.exhaustions(), 1);
    }

    struct PanickingObserver;

    impl RetryObserver for PanickingObserver {
        fn on_attempt_start(&self, _operation: &str, _attempt: u32, _max_attempts: u32) {}

        fn on_retry_scheduled(&self, _operation: &str, _record: &AttemptRecord) {
            panic!("sink unavailable");
        }

        fn on_success(&self, _operation: &str, _attempt: u32, _total_duration: Duration) {}

        fn on_exhausted(&self, _operation: &str, _attempts: u32, _final_error: &dyn Display) {}
    }

    #[test]
    fn test_panicking_half_does_not_starve_the_other() {
        let stats = Arc::new(StatsObserver::new());
        let pair = (PanickingObserver, stats.clone());

        pair.on_retry_scheduled("op", &record(1));

        assert_eq!(stats.retries(), 1);
    }

    #[test]
    fn test_box_observer() {
        let observer: Box<dyn RetryObserver> = Box::new(TracingObserver);
        observer.on_attempt_start("op", 1, 3);
        observer.on_retry_scheduled("op", &record(1));
    }
}
