//! Interaction suppression for the external resource
//!
//! While an operation runs against the workbook, manual edits must be
//! blocked. `InteractionGuard` turns interaction off when engaged and turns
//! it back on when dropped, whichever way the session ends.

/// Enables or disables interactive use of the external resource
pub trait InteractionToggle {
    fn set_interactive(&self, enabled: bool) -> anyhow::Result<()>;
}

/// RAII guard that restores interaction on drop
///
/// Restoration runs at most once and only if suppression succeeded; a failed
/// restore is logged, never propagated.
pub struct InteractionGuard<'a> {
    toggle: &'a dyn InteractionToggle,
    operation: String,
    engaged: bool,
}

impl<'a> InteractionGuard<'a> {
    /// Suppress interaction for the duration of `operation`
    ///
    /// A toggle that fails to suppress leaves the guard inert; the operation
    /// still runs.
    pub fn engage(toggle: &'a dyn InteractionToggle, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let engaged = match toggle.set_interactive(false) {
            Ok(()) => {
                tracing::debug!(operation = %operation, "interaction suppressed");
                true
            }
            Err(err) => {
                tracing::warn!(
                    operation = %operation,
                    error = %err,
                    "could not suppress interaction; continuing without it"
                );
                false
            }
        };

        Self {
            toggle,
            operation,
            engaged,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

impl Drop for InteractionGuard<'_> {
    fn drop(&mut self) {
        if !std::mem::replace(&mut self.engaged, false) {
            return;
        }
        match self.toggle.set_interactive(true) {
            Ok(()) => tracing::debug!(operation = %self.operation, "interaction restored"),
            Err(err) => tracing::warn!(
                operation = %self.operation,
                error = %err,
                "could not restore interaction"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Counts suppressions outstanding
    #[derive(Default)]
    struct Counter {
        suppressed: Cell<i32>,
        fail_suppress: bool,
        fail_restore: bool,
    }

    impl InteractionToggle for Counter {
        fn set_interactive(&self, enabled: bool) -> anyhow::Result<()> {
            if enabled {
                if self.fail_restore {
                    anyhow::bail!("workbook busy");
                }
                self.suppressed.set(self.suppressed.get() - 1);
            } else {
                if self.fail_suppress {
                    anyhow::bail!("workbook busy");
                }
                self.suppressed.set(self.suppressed.get() + 1);
            }
            Ok(())
        }
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let toggle = Counter::default();
        {
            let guard = InteractionGuard::engage(&toggle, "stocks");
            assert!(guard.is_engaged());
            assert_eq!(toggle.suppressed.get(), 1);
        }
        assert_eq!(toggle.suppressed.get(), 0);
    }

    #[test]
    fn test_failed_suppression_skips_restore() {
        let toggle = Counter {
            fail_suppress: true,
            ..Counter::default()
        };
        {
            let guard = InteractionGuard::engage(&toggle, "stocks");
            assert!(!guard.is_engaged());
        }
        assert_eq!(toggle.suppressed.get(), 0);
    }

    #[test]
    fn test_failed_restore_does_not_panic() {
        let toggle = Counter {
            fail_restore: true,
            ..Counter::default()
        };
        drop(InteractionGuard::engage(&toggle, "stocks"));
        assert_eq!(toggle.suppressed.get(), 1);
    }

    #[test]
    fn test_guard_restores_while_unwinding() {
        let toggle = Counter::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = InteractionGuard::engage(&toggle, "stocks");
            panic!("loop task failed");
        }));

        assert!(result.is_err());
        assert_eq!(toggle.suppressed.get(), 0);
    }
}
