//! Cellpilot Core Library
//!
//! Resilient execution core for driving a workbook through a fragile call
//! interface:
//! - Retry with exponential backoff, jitter and attempt history
//! - Liveness probes for the external resource
//! - An execution coordinator that keeps the interactive loop responsive
//! - Failure records written next to the workbook
//! - Layered configuration

pub mod config;
pub mod coordinator;
pub mod error;
pub mod interaction;
pub mod liveness;
pub mod report;
pub mod retry;
pub mod types;

pub use coordinator::{ExecutionCoordinator, Session, SessionOutcome, SessionStatus};
pub use error::{Error, Result};
pub use interaction::{InteractionGuard, InteractionToggle};
pub use liveness::LivenessProbe;
pub use report::{FailureReport, FailureReporter, FileFailureReporter};
pub use types::*;

/// Version of the execution core linked into a binary
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
