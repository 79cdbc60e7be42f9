//! Liveness probes for the external resource
//!
//! A probe answers one question: is the workbook the operation depends on
//! still reachable? Probes never fail: an inconclusive check (an error or a
//! panic inside the check) reports the resource as gone, so the coordinator
//! aborts instead of acting on a resource that may have vanished.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// Reports whether the external resource is still reachable
///
/// Implementations must return quickly; the coordinator calls them on the
/// interactive loop's thread.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self) -> bool;
}

impl<F> LivenessProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_alive(&self) -> bool {
        self()
    }
}

/// Adapts a check that can fail into a probe that cannot
///
/// Errors and panics are logged and reported as `false`.
///
/// # Example
///
/// ```rust
/// use cellpilot_core::liveness::{FallibleProbe, LivenessProbe};
///
/// let probe = FallibleProbe::new("workbook", || anyhow::bail!("server unavailable"));
/// assert!(!probe.is_alive());
/// ```
pub struct FallibleProbe<F> {
    name: String,
    check: F,
}

impl<F> FallibleProbe<F>
where
    F: Fn() -> anyhow::Result<bool> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> LivenessProbe for FallibleProbe<F>
where
    F: Fn() -> anyhow::Result<bool> + Send + Sync,
{
    fn is_alive(&self) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.check)())) {
            Ok(Ok(alive)) => alive,
            Ok(Err(err)) => {
                tracing::warn!(probe = %self.name, error = %err, "liveness check failed; treating resource as gone");
                false
            }
            Err(_) => {
                tracing::warn!(probe = %self.name, "liveness check panicked; treating resource as gone");
                false
            }
        }
    }
}

/// Probe that considers a workbook alive while its file exists
#[derive(Debug, Clone)]
pub struct PathProbe {
    path: PathBuf,
}

impl PathProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LivenessProbe for PathProbe {
    fn is_alive(&self) -> bool {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta.is_file(),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "workbook not reachable");
                false
            }
        }
    }
}
