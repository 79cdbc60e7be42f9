//! Retry execution engine
//!
//! This module provides the core retry execution logic with configurable
//! policies, predicates, and observers. The same decision step drives both
//! the async `execute` (backoff via `tokio::time::sleep`) and
//! `execute_blocking` (backoff via `std::thread::sleep`), the latter being
//! what runs on coordinator worker threads.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::history::{short_type_name, AttemptRecord};
use super::observer::{notify_guarded, NoOpObserver, RetryObserver, TracingObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Execute an async operation with retry logic based on a policy
///
/// Every error is treated as retryable and retry decisions are logged through
/// `TracingObserver`. For more control, use `RetryExecutorBuilder`.
///
/// # Example
///
/// ```rust,no_run
/// use cellpilot_core::retry::retry_with_policy;
/// use cellpilot_core::types::RetryPolicy;
///
/// async fn example() {
///     let policy = RetryPolicy::default();
///
///     let result = retry_with_policy(&policy, || async {
///         Ok::<_, std::io::Error>("success")
///     }).await;
/// }
/// ```
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .with_observer(TracingObserver)
        .build()
        .execute(op)
        .await
}

/// Execute a blocking operation with retry logic based on a policy
///
/// Backoff sleeps block the calling thread; never call this from the
/// interactive loop.
pub fn retry_blocking<F, T, E>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .with_observer(TracingObserver)
        .build()
        .execute_blocking(op)
}

/// Builder for configuring a `RetryExecutor`
///
/// # Example
///
/// ```rust
/// use cellpilot_core::retry::{ClassifiedPredicate, RetryExecutorBuilder, TracingObserver};
/// use cellpilot_core::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_predicate(ClassifiedPredicate)
///     .with_observer(TracingObserver)
///     .with_operation("write_prices")
///     .build();
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    operation: String,
    seed: Option<u64>,
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            operation: "retry".to_string(),
            seed: None,
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the retry predicate
    ///
    /// Errors the predicate rejects are returned immediately without
    /// consuming the remaining attempt budget.
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            operation: self.operation,
            seed: self.seed,
        }
    }

    /// Set the observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            operation: self.operation,
            seed: self.seed,
        }
    }

    /// Name the operation in observer callbacks and retry notices
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Seed the jitter generator
    ///
    /// Every `execute` call starts from the same seed, so identical inputs
    /// produce identical delay schedules.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            operation: self.operation,
            seed: self.seed,
        }
    }
}

/// A retry executor with configurable policy, predicate, and observer
///
/// Use `RetryExecutorBuilder` to create an instance. The executor holds no
/// per-call state: each invocation owns its attempt counter, history and
/// jitter generator, so one executor may serve concurrent calls.
pub struct RetryExecutor<P, O> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    operation: String,
    seed: Option<u64>,
}

/// Per-invocation bookkeeping
struct Attempts {
    current: u32,
    max: u32,
    history: Vec<AttemptRecord>,
    started: Instant,
    rng: StdRng,
}

enum Step<T, E> {
    Done(Result<T, RetryError<E>>),
    Retry(Duration),
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    /// The policy this executor applies
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The operation name used in notices
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Execute an async operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: RetryPredicate<E>,
    {
        let mut attempts = self.begin();

        loop {
            self.announce(&attempts);

            match self.settle(&mut attempts, op().await) {
                Step::Done(outcome) => return outcome,
                Step::Retry(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Execute a blocking operation with retry logic
    ///
    /// Backoff delays block the current thread.
    pub fn execute_blocking<F, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
        P: RetryPredicate<E>,
    {
        let mut attempts = self.begin();

        loop {
            self.announce(&attempts);

            match self.settle(&mut attempts, op()) {
                Step::Done(outcome) => return outcome,
                Step::Retry(delay) => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    fn begin(&self) -> Attempts {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        Attempts {
            current: 1,
            // A zero budget still makes the first call
            max: self.policy.max_attempts.max(1),
            history: Vec::new(),
            started: Instant::now(),
            rng,
        }
    }

    fn announce(&self, attempts: &Attempts) {
        notify_guarded(&self.operation, || {
            self.observer
                .on_attempt_start(&self.operation, attempts.current, attempts.max)
        });
    }

    /// Decide what follows one attempt's result
    fn settle<T, E>(&self, attempts: &mut Attempts, result: Result<T, E>) -> Step<T, E>
    where
        E: Display,
        P: RetryPredicate<E>,
    {
        let attempt = attempts.current;
        let err = match result {
            Ok(value) => {
                let elapsed = attempts.started.elapsed();
                notify_guarded(&self.operation, || {
                    self.observer.on_success(&self.operation, attempt, elapsed)
                });
                return Step::Done(Ok(value));
            }
            Err(err) => err,
        };

        if !self.predicate.should_retry(&err) {
            notify_guarded(&self.operation, || {
                self.observer
                    .on_non_retryable(&self.operation, attempt, &err)
            });
            let history = std::mem::take(&mut attempts.history);
            return Step::Done(Err(RetryError::non_retryable(err, history)));
        }

        if attempt >= attempts.max {
            notify_guarded(&self.operation, || {
                self.observer.on_exhausted(&self.operation, attempt, &err)
            });
            let history = std::mem::take(&mut attempts.history);
            return Step::Done(Err(RetryError::exhausted(
                attempt,
                err,
                history,
                attempts.started.elapsed(),
            )));
        }

        let delay = calculate_delay(&self.policy, attempt, &mut attempts.rng);
        let record = AttemptRecord {
            attempt_index: attempt,
            failure_kind: short_type_name::<E>(),
            failure_message: err.to_string(),
            computed_delay: delay,
            attempts_remaining: attempts.max - attempt,
        };

        notify_guarded(&self.operation, || {
            self.observer.on_retry_scheduled(&self.operation, &record)
        });

        attempts.history.push(record);
        attempts.current += 1;
        Step::Retry(delay)
    }
}
