//! Retry execution engine with policy-based configuration
//!
//! Calls into the workbook fail for transient reasons (a busy server, a
//! rejected call). This module wraps such calls in a policy-driven retry
//! loop with exponential backoff and jitter.
//!
//! # Features
//!
//! - Exponential backoff with an optional cap and fractional jitter
//! - Retry eligibility decided by a `RetryPredicate`, including the closed
//!   `FailureKind` classification via `ClassifiedPredicate`
//! - Full attempt history attached to terminal failures
//! - Observable retry decisions via the `RetryObserver` trait
//! - Async and blocking execution sharing one decision step
//!
//! # Example
//!
//! ```rust,no_run
//! use cellpilot_core::retry::{retry_with_policy, RetryError};
//! use cellpilot_core::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let policy = RetryPolicy::default();
//!
//!     retry_with_policy(&policy, || async {
//!         Ok("success".to_string())
//!     }).await
//! }
//! ```

mod error;
mod executor;
mod history;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{retry_blocking, retry_with_policy, RetryExecutor, RetryExecutorBuilder};
pub use history::AttemptRecord;
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    base_delay, calculate_delay, AlwaysRetry, Classify, ClassifiedPredicate, ClosurePredicate,
    FailureKind, MessagePredicate, NeverRetry, RetryPredicate,
};

/// Result of a possibly-retried operation
pub type OperationOutcome<T, E> = Result<T, RetryError<E>>;
