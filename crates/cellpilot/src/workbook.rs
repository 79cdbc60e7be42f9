//! Simulated workbook operations
//!
//! Each task is a stand-in for a slow call into the workbook: it takes a
//! while, fails transiently at a configured rate and can be forced to fail
//! permanently. Interaction with the workbook is suppressed by a lock file
//! next to it for as long as a task runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cellpilot_core::interaction::InteractionToggle;
use cellpilot_core::retry::{
    Classify, ClassifiedPredicate, FailureKind, OperationOutcome, RetryExecutorBuilder,
    RetryObserver,
};
use cellpilot_core::types::RetryPolicy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Granularity at which a running call notices the workbook disappearing
const SLICE: Duration = Duration::from_millis(50);

/// Failures of a call into the workbook
#[derive(Debug, Error)]
pub enum WorkbookError {
    /// The workbook was busy and refused the call
    #[error("call was rejected by callee while running '{task}'")]
    CallRejected { task: String },

    /// The call can never succeed as issued
    #[error("'{task}' cannot be applied: {reason}")]
    Permanent { task: String, reason: String },

    /// The workbook vanished while the call was in progress
    #[error("workbook {path} is no longer available")]
    Closed { path: String },
}

impl Classify for WorkbookError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            WorkbookError::CallRejected { .. } => FailureKind::Transient,
            WorkbookError::Permanent { .. } | WorkbookError::Closed { .. } => {
                FailureKind::Permanent
            }
        }
    }
}

/// One simulated call into the workbook
#[derive(Debug, Clone)]
pub struct SimulatedCall {
    pub task: String,
    pub workbook: PathBuf,
    pub duration: Duration,
    pub failure_rate: f64,
    pub permanent: bool,
}

impl SimulatedCall {
    /// Perform the call once, returning how long it took
    pub fn attempt<R: Rng>(&self, rng: &mut R) -> Result<Duration, WorkbookError> {
        let started = Instant::now();
        let mut remaining = self.duration;

        while !remaining.is_zero() {
            if !self.workbook.is_file() {
                return Err(WorkbookError::Closed {
                    path: self.workbook.display().to_string(),
                });
            }
            let slice = remaining.min(SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }

        if self.permanent {
            return Err(WorkbookError::Permanent {
                task: self.task.clone(),
                reason: "target sheet is protected".to_string(),
            });
        }

        if self.failure_rate > 0.0 && rng.random_bool(self.failure_rate.min(1.0)) {
            return Err(WorkbookError::CallRejected {
                task: self.task.clone(),
            });
        }

        Ok(started.elapsed())
    }
}

/// Run `call` under `policy`, retrying transient rejections
///
/// With a seed, both the simulated failures and the backoff jitter are
/// reproducible.
pub fn run_task<O>(
    call: SimulatedCall,
    policy: RetryPolicy,
    observer: O,
    seed: Option<u64>,
) -> OperationOutcome<Duration, WorkbookError>
where
    O: RetryObserver,
{
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let mut builder = RetryExecutorBuilder::new()
        .with_policy(policy)
        .with_predicate(ClassifiedPredicate)
        .with_observer(observer)
        .with_operation(call.task.clone());
    if let Some(seed) = seed {
        builder = builder.with_seed(seed);
    }

    builder.build().execute_blocking(|| call.attempt(&mut rng))
}

/// Suppresses interaction by holding a lock file beside the workbook
#[derive(Debug, Clone)]
pub struct LockFileToggle {
    path: PathBuf,
}

impl LockFileToggle {
    /// Lock file `~$<name>.cellpilot` in the workbook's folder
    pub fn for_workbook(workbook: &Path) -> Self {
        let name = workbook
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook".to_string());
        let dir = workbook.parent().unwrap_or_else(|| Path::new(""));

        Self {
            path: dir.join(format!("~${}.cellpilot", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InteractionToggle for LockFileToggle {
    fn set_interactive(&self, enabled: bool) -> anyhow::Result<()> {
        if enabled {
            match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err)
                    .with_context(|| format!("Failed to remove lock file {}", self.path.display())),
            }
        } else {
            fs::write(
                &self.path,
                format!("locked by cellpilot (pid {})\n", std::process::id()),
            )
            .with_context(|| format!("Failed to create lock file {}", self.path.display()))
        }
    }
}
