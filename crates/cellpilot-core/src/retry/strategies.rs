//! Retry delay calculation and predicates
//!
//! This module implements the backoff schedule and provides a trait for
//! determining whether an error should be retried.

use crate::types::RetryPolicy;
use rand::Rng;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Calculate the un-jittered delay after a failed attempt
///
/// `attempt` is 1-indexed: the delay after the first failure is the policy's
/// initial delay, and every later failure multiplies it by the backoff
/// multiplier. The optional `max_delay_ms` cap is applied last.
///
/// # Example
///
/// ```rust
/// use cellpilot_core::retry::base_delay;
/// use cellpilot_core::types::RetryPolicy;
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     initial_delay_ms: 1000,
///     backoff_multiplier: 2.0,
///     jitter_fraction: 0.0,
///     max_delay_ms: None,
/// };
///
/// assert_eq!(base_delay(&policy, 1).as_millis(), 1000);
/// assert_eq!(base_delay(&policy, 2).as_millis(), 2000);
/// ```
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier = policy.backoff_multiplier.max(1.0).powi(exponent as i32);
    let secs = policy.initial_delay().as_secs_f64() * multiplier;
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

    match policy.max_delay() {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// Calculate the delay before the next attempt, jitter included
///
/// Jitter is drawn uniformly from `[0, jitter_fraction * base]` using the
/// caller's generator, so a seeded generator yields a reproducible schedule.
pub fn calculate_delay<R: Rng>(policy: &RetryPolicy, attempt: u32, rng: &mut R) -> Duration {
    let base = base_delay(policy, attempt);
    let jitter_ceiling = base.as_secs_f64() * policy.jitter_fraction.clamp(0.0, 1.0);

    if jitter_ceiling.is_nan() || jitter_ceiling <= 0.0 {
        return base;
    }

    let jitter = rng.random_range(0.0..=jitter_ceiling);
    base.saturating_add(Duration::try_from_secs_f64(jitter).unwrap_or(Duration::ZERO))
}

/// Closed set of failure classes used for retry eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Likely to succeed if the call is repeated
    Transient,
    /// Repeating the call cannot help
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Errors that know which `FailureKind` they belong to
pub trait Classify {
    /// The failure class of this error
    fn failure_kind(&self) -> FailureKind;
}

impl Classify for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

/// A predicate that determines whether an error should be retried
///
/// # Example
///
/// ```rust
/// use cellpilot_core::retry::RetryPredicate;
/// use std::io::{Error, ErrorKind};
///
/// struct IoRetryPredicate;
///
/// impl RetryPredicate<Error> for IoRetryPredicate {
///     fn should_retry(&self, error: &Error) -> bool {
///         !matches!(
///             error.kind(),
///             ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
///         )
///     }
/// }
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;
}

/// A predicate that always returns true (all errors are retryable)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// A predicate that never retries (no errors are retryable)
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E) -> bool {
        false
    }
}

/// Retries exactly the errors that classify as `FailureKind::Transient`
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifiedPredicate;

impl<E: Classify + ?Sized> RetryPredicate<E> for ClassifiedPredicate {
    fn should_retry(&self, error: &E) -> bool {
        error.failure_kind() == FailureKind::Transient
    }
}

/// A predicate that uses a closure to determine retryability
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// A predicate that retries only on specific error messages
#[derive(Debug, Clone)]
pub struct MessagePredicate {
    /// Patterns that indicate retryable errors
    retryable_patterns: Vec<String>,
}

impl MessagePredicate {
    /// Create a new message predicate with the given patterns
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            retryable_patterns: patterns,
        }
    }

    /// Create a predicate for the usual transient inter-process call errors
    pub fn ipc_errors() -> Self {
        Self::new(vec![
            "call was rejected".to_string(),
            "server is busy".to_string(),
            "rpc server is unavailable".to_string(),
            "application is busy".to_string(),
            "timed out".to_string(),
            "temporarily unavailable".to_string(),
        ])
    }
}

impl<E: Error> RetryPredicate<E> for MessagePredicate {
    fn should_retry(&self, error: &E) -> bool {
        let error_msg = error.to_string().to_lowercase();
        self.retryable_patterns
            .iter()
            .any(|pattern| error_msg.contains(&pattern.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io;

    fn policy(multiplier: f64, jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 1000,
            backoff_multiplier: multiplier,
            jitter_fraction: jitter,
            max_delay_ms: None,
        }
    }

    #[test]
    fn test_exponential_schedule() {
        let policy = policy(2.0, 0.0);

        assert_eq!(base_delay(&policy, 1), Duration::from_millis(1000));
        assert_eq!(base_delay(&policy, 2), Duration::from_millis(2000));
        assert_eq!(base_delay(&policy, 3), Duration::from_millis(4000));
        assert_eq!(base_delay(&policy, 4), Duration::from_millis(8000));
    }

    #[test]
    fn test_unit_multiplier_is_constant() {
        let policy = policy(1.0, 0.0);

        for attempt in 1..=5 {
            assert_eq!(base_delay(&policy, attempt), Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy {
            max_delay_ms: Some(5000),
            ..policy(2.0, 0.0)
        };

        // 1000 * 2^4 = 16000, capped
        assert_eq!(base_delay(&policy, 5), Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = policy(2.0, 0.0);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(
            calculate_delay(&policy, 3, &mut rng),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy(2.0, 0.25);
        let mut rng = rand::rng();

        for _ in 0..200 {
            let delay = calculate_delay(&policy, 1, &mut rng);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_seeded_jitter_repeats() {
        let policy = policy(2.0, 0.5);
        let mut first = StdRng::seed_from_u64(42);
        let mut second = StdRng::seed_from_u64(42);

        for attempt in 1..=4 {
            assert_eq!(
                calculate_delay(&policy, attempt, &mut first),
                calculate_delay(&policy, attempt, &mut second)
            );
        }
    }

    #[test]
    fn test_huge_exponent_saturates() {
        let policy = policy(10.0, 0.0);
        assert_eq!(base_delay(&policy, 400), Duration::MAX);
    }

    #[test]
    fn test_always_and_never_retry() {
        let error = io::Error::new(io::ErrorKind::NotFound, "not found");

        assert!(AlwaysRetry.should_retry(&error));
        assert!(!NeverRetry.should_retry(&error));
    }

    #[test]
    fn test_classified_predicate_on_io_errors() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "timeout");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");

        assert_eq!(timeout.failure_kind(), FailureKind::Transient);
        assert!(ClassifiedPredicate.should_retry(&timeout));
        assert!(!ClassifiedPredicate.should_retry(&denied));
    }

    #[test]
    fn test_closure_predicate() {
        let predicate = ClosurePredicate::new(|err: &io::Error| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            )
        });

        let timeout_err = io::Error::new(io::ErrorKind::TimedOut, "timeout");
        let not_found_err = io::Error::new(io::ErrorKind::NotFound, "not found");

        assert!(predicate.should_retry(&timeout_err));
        assert!(!predicate.should_retry(&not_found_err));
    }

    #[test]
    fn test_message_predicate_ipc_errors() {
        let predicate = MessagePredicate::ipc_errors();

        let rejected = io::Error::other("Call was rejected by callee. (0x80010001)");
        let busy = io::Error::other("The RPC server is unavailable");
        let bad_range = io::Error::other("range 'ZZ0' is invalid");

        assert!(predicate.should_retry(&rejected));
        assert!(predicate.should_retry(&busy));
        assert!(!predicate.should_retry(&bad_range));
    }
}
