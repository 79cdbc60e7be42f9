//! Error types for the retry execution engine
//!
//! This module defines the terminal failures of a retried operation. Each
//! variant that stems from the operation carries the attempt history so a
//! failure report can list every retry decision that preceded it. Operation
//! failures capture a backtrace when they are built (subject to
//! `RUST_BACKTRACE`); worker panics carry the panic site.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;
use std::time::Duration;

use super::history::AttemptRecord;

/// Errors that can occur during retry execution
///
/// The error type is generic over `E`, the underlying error type from the
/// operation being retried.
#[derive(Debug)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// One record per failed attempt that was retried
        history: Vec<AttemptRecord>,
        /// Total duration spent across all attempts
        total_duration: Duration,
        /// Stack of the caller that gave up
        backtrace: Backtrace,
    },

    /// The error is not retryable
    ///
    /// Returned as soon as the predicate rejects a failure; remaining budget
    /// is not consumed.
    NonRetryable {
        /// The rejected error
        source: E,
        /// Retries that happened before the rejected failure
        history: Vec<AttemptRecord>,
        /// Stack of the caller that gave up
        backtrace: Backtrace,
    },

    /// The worker running the operation panicked or could not be started
    WorkerLost {
        /// Panic payload or spawn error text
        message: String,
        /// `file:line:col` of the panic
        location: Option<String>,
        /// Worker stack at the panic
        backtrace: Option<Backtrace>,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
                ..
            } => {
                write!(
                    f,
                    "retry exhausted after {} attempts over {:.2}s: {}",
                    attempts,
                    total_duration.as_secs_f64(),
                    source
                )
            }
            RetryError::NonRetryable { source, .. } => {
                write!(f, "non-retryable error: {}", source)
            }
            RetryError::WorkerLost { message, .. } => {
                write!(f, "worker lost: {}", message)
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::WorkerLost { .. } => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Create a new exhausted error
    pub fn exhausted(
        attempts: u32,
        source: E,
        history: Vec<AttemptRecord>,
        total_duration: Duration,
    ) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            history,
            total_duration,
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a new non-retryable error
    pub fn non_retryable(source: E, history: Vec<AttemptRecord>) -> Self {
        RetryError::NonRetryable {
            source,
            history,
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a new worker-lost error
    pub fn worker_lost(message: impl Into<String>) -> Self {
        RetryError::WorkerLost {
            message: message.into(),
            location: None,
            backtrace: None,
        }
    }

    /// Create a worker-lost error for a panic observed at `location`
    pub fn worker_panicked(
        message: impl Into<String>,
        location: Option<String>,
        backtrace: Option<Backtrace>,
    ) -> Self {
        RetryError::WorkerLost {
            message: message.into(),
            location,
            backtrace,
        }
    }

    /// Wrap the error of an operation that was never retried
    pub fn single(source: E) -> Self {
        RetryError::exhausted(1, source, Vec::new(), Duration::ZERO)
    }

    /// Get the number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable { history, .. } => history.len() as u32 + 1,
            RetryError::WorkerLost { .. } => 0,
        }
    }

    /// Attempt history, oldest first
    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            RetryError::Exhausted { history, .. } => history,
            RetryError::NonRetryable { history, .. } => history,
            RetryError::WorkerLost { .. } => &[],
        }
    }

    /// Captured stack, if one was recorded
    pub fn backtrace(&self) -> Option<&Backtrace> {
        let backtrace = match self {
            RetryError::Exhausted { backtrace, .. } => backtrace,
            RetryError::NonRetryable { backtrace, .. } => backtrace,
            RetryError::WorkerLost { backtrace, .. } => backtrace.as_ref()?,
        };
        (backtrace.status() == BacktraceStatus::Captured).then_some(backtrace)
    }

    /// Where the worker panicked
    pub fn panic_location(&self) -> Option<&str> {
        match self {
            RetryError::WorkerLost { location, .. } => location.as_deref(),
            _ => None,
        }
    }

    /// Check if this error indicates all retries were exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if this error is non-retryable
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Check if the worker was lost
    pub fn is_worker_lost(&self) -> bool {
        matches!(self, RetryError::WorkerLost { .. })
    }

    /// Get the underlying error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::WorkerLost { .. } => None,
        }
    }

    /// Get a reference to the underlying error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::WorkerLost { .. } => None,
        }
    }

    /// Map the error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                history,
                total_duration,
                backtrace,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                history,
                total_duration,
                backtrace,
            },
            RetryError::NonRetryable {
                source,
                history,
                backtrace,
            } => RetryError::NonRetryable {
                source: f(source),
                history,
                backtrace,
            },
            RetryError::WorkerLost {
                message,
                location,
                backtrace,
            } => RetryError::WorkerLost {
                message,
                location,
                backtrace,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn record(index: u32) -> AttemptRecord {
        AttemptRecord {
            attempt_index: index,
            failure_kind: "Error".to_string(),
            failure_message: "busy".to_string(),
            computed_delay: Duration::from_millis(100),
            attempts_remaining: 3 - index,
        }
    }

    #[test]
    fn test_exhausted_error() {
        let err: RetryError<io::Error> = RetryError::exhausted(
            3,
            io::Error::new(io::ErrorKind::TimedOut, "timeout"),
            vec![record(1), record(2)],
            Duration::from_secs(5),
        );

        assert!(err.is_exhausted());
        assert!(!err.is_non_retryable());
        assert!(!err.is_worker_lost());
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.history().len(), 2);
    }

    #[test]
    fn test_non_retryable_error() {
        let err: RetryError<io::Error> = RetryError::non_retryable(
            io::Error::new(io::ErrorKind::NotFound, "not found"),
            Vec::new(),
        );

        assert!(err.is_non_retryable());
        assert_eq!(err.attempts(), 1);
        assert!(err.history().is_empty());
    }

    #[test]
    fn test_non_retryable_after_retries_counts_attempts() {
        let err: RetryError<String> =
            RetryError::non_retryable("fatal".to_string(), vec![record(1), record(2)]);
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn test_worker_lost() {
        let err: RetryError<io::Error> = RetryError::worker_lost("boom");
        assert!(err.is_worker_lost());
        assert_eq!(err.attempts(), 0);
        assert!(err.source_ref().is_none());
        assert_eq!(err.to_string(), "worker lost: boom");
        assert!(err.panic_location().is_none());
        assert!(err.backtrace().is_none());
    }

    #[test]
    fn test_worker_panicked_keeps_site() {
        let err: RetryError<io::Error> = RetryError::worker_panicked(
            "boom",
            Some("src/workbook.rs:12:9".to_string()),
            Some(Backtrace::force_capture()),
        );
        assert_eq!(err.panic_location(), Some("src/workbook.rs:12:9"));
        assert!(err.backtrace().is_some());
        assert_eq!(err.to_string(), "worker lost: boom");

        let mapped = err.map_err(|e| e.to_string());
        assert_eq!(mapped.panic_location(), Some("src/workbook.rs:12:9"));
    }

    #[test]
    fn test_single_has_empty_history() {
        let err = RetryError::single("original error".to_string());
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 1);
        assert!(err.history().is_empty());
        assert_eq!(err.into_source(), Some("original error".to_string()));
    }

    #[test]
    fn test_map_err_keeps_history() {
        let err: RetryError<i32> =
            RetryError::exhausted(2, 42, vec![record(1)], Duration::from_secs(1));

        let mapped = err.map_err(|n| format!("error code: {}", n));
        assert_eq!(mapped.history().len(), 1);
        assert!(matches!(
            mapped,
            RetryError::Exhausted { source, .. } if source == "error code: 42"
        ));
    }

    #[test]
    fn test_display_and_source() {
        let err: RetryError<io::Error> = RetryError::exhausted(
            3,
            io::Error::new(io::ErrorKind::TimedOut, "connection timeout"),
            Vec::new(),
            Duration::from_secs(5),
        );

        let display = format!("{}", err);
        assert!(display.contains("retry exhausted"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("connection timeout"));
        assert!(err.source().is_some());
    }
}
