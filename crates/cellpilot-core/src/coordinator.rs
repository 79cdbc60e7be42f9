//! Execution coordinator
//!
//! Runs one slow, fallible operation on a worker thread while the interactive
//! loop stays responsive. The loop task awaits the worker's result and, on a
//! fixed tick, reports elapsed time, logs milestones and re-checks that the
//! workbook is still there. If the workbook disappears the session is
//! aborted at once and the worker is left to finish on its own. A failure
//! that arrives after the workbook is already gone is treated the same way.
//!
//! # Example
//!
//! ```rust,no_run
//! use cellpilot_core::coordinator::{ExecutionCoordinator, SessionOutcome};
//! use cellpilot_core::retry::RetryError;
//! use cellpilot_core::types::CoordinatorSettings;
//!
//! async fn example() {
//!     let mut coordinator = ExecutionCoordinator::new(CoordinatorSettings::default());
//!     let probe = || true;
//!
//!     let outcome = coordinator
//!         .session("stocks", &probe)
//!         .on_progress(|elapsed| println!("{:.1}s", elapsed.as_secs_f64()))
//!         .run(|| Ok::<_, RetryError<std::io::Error>>(42))
//!         .await;
//!
//!     assert!(matches!(outcome, SessionOutcome::Completed(42)));
//! }
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};

use crate::interaction::{InteractionGuard, InteractionToggle};
use crate::liveness::LivenessProbe;
use crate::report::{FailureReport, FailureReporter};
use crate::retry::{OperationOutcome, RetryError};
use crate::types::CoordinatorSettings;

/// Lifecycle of one execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Aborted
        )
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Aborted) | (Running, Completed | Failed | Aborted)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome<T, E> {
    Completed(T),
    Failed(RetryError<E>),
    /// The workbook was gone before dispatch or vanished mid-flight
    Aborted,
}

impl<T, E> SessionOutcome<T, E> {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionOutcome::Completed(_) => SessionStatus::Completed,
            SessionOutcome::Failed(_) => SessionStatus::Failed,
            SessionOutcome::Aborted => SessionStatus::Aborted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionOutcome::Failed(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SessionOutcome::Aborted)
    }
}

/// Worker thread the coordinator no longer waits on
struct DetachedWorker {
    operation: String,
    handle: JoinHandle<()>,
}

/// Dispatches operations to worker threads and supervises them
///
/// Only one session runs at a time: `session` borrows the coordinator
/// mutably for as long as the session lives.
pub struct ExecutionCoordinator {
    settings: CoordinatorSettings,
    reporter: Option<Arc<dyn FailureReporter>>,
    detached: Vec<DetachedWorker>,
    last_report: Option<PathBuf>,
}

impl ExecutionCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            settings,
            reporter: None,
            detached: Vec::new(),
            last_report: None,
        }
    }

    /// Hand failed sessions to `reporter`
    pub fn with_reporter(mut self, reporter: impl FailureReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Start describing a session for `operation` guarded by `probe`
    pub fn session<'a>(
        &'a mut self,
        operation: impl Into<String>,
        probe: &'a dyn LivenessProbe,
    ) -> Session<'a> {
        Session {
            coordinator: self,
            operation: operation.into(),
            probe,
            toggle: None,
            on_progress: None,
            status: SessionStatus::Pending,
        }
    }

    /// Where the most recent failed session's record was written
    pub fn last_report(&self) -> Option<&Path> {
        self.last_report.as_deref()
    }

    /// Detached workers that are still running
    pub fn outstanding_workers(&self) -> usize {
        self.detached
            .iter()
            .filter(|worker| !worker.handle.is_finished())
            .count()
    }

    /// Join detached workers that finish within `timeout`
    ///
    /// Workers still running at the deadline stay detached. Returns how many
    /// were left behind.
    pub async fn reap(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            self.collect_finished();
            let now = Instant::now();
            if self.detached.is_empty() || now >= deadline {
                break;
            }
            time::sleep(self.settings.poll_interval().min(deadline - now)).await;
        }

        let remaining = self.detached.len();
        if remaining > 0 {
            let operations: Vec<&str> = self
                .detached
                .iter()
                .map(|worker| worker.operation.as_str())
                .collect();
            tracing::warn!(
                count = remaining,
                operations = ?operations,
                "leaving abandoned workers detached"
            );
        }
        remaining
    }

    fn collect_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .detached
            .drain(..)
            .partition(|worker| worker.handle.is_finished());
        self.detached = running;

        for worker in finished {
            if worker.handle.join().is_err() {
                tracing::debug!(operation = %worker.operation, "detached worker ended by panic");
            } else {
                tracing::debug!(operation = %worker.operation, "detached worker joined");
            }
        }
    }

    fn detach(&mut self, operation: String, handle: JoinHandle<()>) {
        self.detached.push(DetachedWorker { operation, handle });
    }

    fn record_failure<E>(&mut self, operation: &str, error: &RetryError<E>)
    where
        E: StdError + 'static,
    {
        let Some(reporter) = self.reporter.as_ref() else {
            return;
        };
        let report = FailureReport::from_error(operation, error);
        match reporter.report(&report) {
            Ok(path) => self.last_report = Some(path),
            Err(err) => {
                tracing::warn!(operation = %operation, error = %err, "failure record not persisted")
            }
        }
    }
}

/// One supervised run of an operation
///
/// Built by `ExecutionCoordinator::session` and consumed by `run`.
pub struct Session<'a> {
    coordinator: &'a mut ExecutionCoordinator,
    operation: String,
    probe: &'a dyn LivenessProbe,
    toggle: Option<&'a dyn InteractionToggle>,
    on_progress: Option<Box<dyn FnMut(Duration) + 'a>>,
    status: SessionStatus,
}

impl<'a> Session<'a> {
    /// Suppress interaction with the workbook while the session runs
    pub fn with_toggle(mut self, toggle: &'a dyn InteractionToggle) -> Self {
        self.toggle = Some(toggle);
        self
    }

    /// Receive elapsed time on the loop thread, throttled to the progress interval
    pub fn on_progress<F>(mut self, sink: F) -> Self
    where
        F: FnMut(Duration) + 'a,
    {
        self.on_progress = Some(Box::new(sink));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Run `op` on a worker thread and supervise it to a terminal status
    pub async fn run<T, E, F>(mut self, op: F) -> SessionOutcome<T, E>
    where
        F: FnOnce() -> OperationOutcome<T, E> + Send + 'static,
        T: Send + 'static,
        E: StdError + Send + 'static,
    {
        self.coordinator.collect_finished();
        self.coordinator.last_report = None;

        if !self.probe.is_alive() {
            tracing::warn!(operation = %self.operation, "workbook is not available; operation not started");
            self.advance(SessionStatus::Aborted);
            return SessionOutcome::Aborted;
        }

        let _guard = self
            .toggle
            .map(|toggle| InteractionGuard::engage(toggle, self.operation.clone()));

        self.advance(SessionStatus::Running);
        install_panic_capture();
        let (tx, mut rx) = oneshot::channel::<OperationOutcome<T, E>>();
        let spawned = thread::Builder::new()
            .name(format!("cellpilot-{}", self.operation))
            .spawn(move || {
                CAPTURE_PANICS.with(|capture| capture.set(true));
                let outcome = catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|payload| {
                    let site = LAST_PANIC.with(|slot| slot.borrow_mut().take());
                    let (location, backtrace) = match site {
                        Some(site) => (site.location, Some(site.backtrace)),
                        None => (None, None),
                    };
                    Err(RetryError::worker_panicked(
                        panic_message(payload.as_ref()),
                        location,
                        backtrace,
                    ))
                });
                // Receiver is gone when the session was aborted
                let _ = tx.send(outcome);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                let error = RetryError::worker_lost(format!("could not start worker: {}", err));
                return self.fail(error);
            }
        };
        tracing::debug!(operation = %self.operation, "operation dispatched");

        let settings = self.coordinator.settings.clone();
        let started = Instant::now();
        // interval() panics on a zero period
        let mut ticker = time::interval(settings.poll_interval().max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut progress_slot: Option<u128> = None;
        let mut liveness_slot = 0;
        let mut milestone_slot = 0;

        let outcome = loop {
            tokio::select! {
                biased;
                received = &mut rx => {
                    break received.unwrap_or_else(|_| {
                        Err(RetryError::worker_lost("worker exited without reporting a result"))
                    });
                }
                _ = ticker.tick() => {}
            }

            let elapsed = started.elapsed();

            let slot = slot_of(elapsed, settings.liveness_interval());
            if slot > liveness_slot {
                liveness_slot = slot;
                if !self.probe.is_alive() {
                    tracing::warn!(
                        operation = %self.operation,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "workbook closed while the operation was running; abandoning worker"
                    );
                    self.coordinator.detach(self.operation.clone(), handle);
                    self.advance(SessionStatus::Aborted);
                    return SessionOutcome::Aborted;
                }
            }

            let slot = slot_of(elapsed, settings.progress_interval());
            if progress_slot.map_or(true, |last| slot > last) {
                progress_slot = Some(slot);
                if let Some(sink) = self.on_progress.as_mut() {
                    sink(elapsed);
                }
            }

            let slot = slot_of(elapsed, settings.milestone_interval());
            if slot > milestone_slot {
                milestone_slot = slot;
                tracing::info!(
                    operation = %self.operation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation still running"
                );
            }
        };

        // The worker has sent its result and is about to exit
        self.coordinator.detach(self.operation.clone(), handle);
        self.coordinator.collect_finished();

        match outcome {
            Ok(value) => {
                tracing::info!(
                    operation = %self.operation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "operation completed"
                );
                self.advance(SessionStatus::Completed);
                SessionOutcome::Completed(value)
            }
            // The worker often notices a closed workbook before the next probe
            Err(error) if !self.probe.is_alive() => {
                tracing::warn!(
                    operation = %self.operation,
                    error = %error,
                    "workbook closed while the operation was running; discarding its failure"
                );
                self.advance(SessionStatus::Aborted);
                SessionOutcome::Aborted
            }
            Err(error) => self.fail(error),
        }
    }

    fn fail<T, E>(&mut self, error: RetryError<E>) -> SessionOutcome<T, E>
    where
        E: StdError + 'static,
    {
        tracing::error!(
            operation = %self.operation,
            attempts = error.attempts(),
            error = %error,
            "operation failed"
        );
        self.advance(SessionStatus::Failed);
        self.coordinator.record_failure(&self.operation, &error);
        SessionOutcome::Failed(error)
    }

    fn advance(&mut self, next: SessionStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal session transition {} -> {}",
            self.status,
            next
        );
        tracing::trace!(operation = %self.operation, from = %self.status, to = %next, "session status");
        self.status = next;
    }
}

/// Index of the `interval`-sized window containing `elapsed`
fn slot_of(elapsed: Duration, interval: Duration) -> u128 {
    elapsed.as_nanos() / interval.as_nanos().max(1)
}

struct PanicSite {
    location: Option<String>,
    backtrace: Backtrace,
}

thread_local! {
    static CAPTURE_PANICS: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

/// Chain a panic hook that records the site of panics on worker threads
///
/// Threads that never set `CAPTURE_PANICS` only see the previous hook.
fn install_panic_capture() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE_PANICS.with(Cell::get) {
                let site = PanicSite {
                    location: info.location().map(ToString::to_string),
                    backtrace: Backtrace::force_capture(),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(site));
            }
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
