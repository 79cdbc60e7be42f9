//! Run command

use anyhow::{anyhow, bail, Result};
use camino::Utf8Path;
use cellpilot_core::coordinator::{ExecutionCoordinator, SessionOutcome};
use cellpilot_core::liveness::PathProbe;
use cellpilot_core::report::FileFailureReporter;
use cellpilot_core::retry::TracingObserver;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::output::{self, ConsoleObserver};
use crate::workbook::{self, LockFileToggle, SimulatedCall};

pub async fn run(args: RunArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;

    // CLI flags take precedence over every config layer
    if let Some(attempts) = args.attempts {
        config.retry.max_attempts = attempts;
    }
    config.validate()?;

    let task = config.task(&args.task)?;
    let failure_rate = args.fail_rate.unwrap_or(task.failure_rate);
    if !(0.0..=1.0).contains(&failure_rate) {
        bail!("--fail-rate must be within [0, 1], got {}", failure_rate);
    }
    let duration = args
        .duration_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| task.duration());

    let name = args.task.to_lowercase();
    let workbook_path = args.workbook.as_std_path().to_path_buf();
    let probe = PathProbe::new(&workbook_path);
    let toggle = LockFileToggle::for_workbook(&workbook_path);
    let reporter = FileFailureReporter::beside(&workbook_path, &config.reporting.log_dir_name);
    let mut coordinator =
        ExecutionCoordinator::new(config.coordinator.clone()).with_reporter(reporter);

    tracing::debug!(
        task = %name,
        workbook = %args.workbook,
        attempts = config.retry.max_attempts,
        failure_rate,
        duration_ms = duration.as_millis() as u64,
        "starting task"
    );

    let spinner = output::spinner(&format!("Running {}...", name));
    let call = SimulatedCall {
        task: name.clone(),
        workbook: workbook_path.clone(),
        duration,
        failure_rate,
        permanent: args.permanent,
    };
    let observer = (TracingObserver, ConsoleObserver::new(spinner.clone()));
    let policy = config.retry.clone();
    let seed = args.seed;

    let outcome = coordinator
        .session(name.clone(), &probe)
        .with_toggle(&toggle)
        .on_progress(|elapsed| {
            spinner.set_message(output::progress_message(&name, elapsed));
            spinner.tick();
        })
        .run(move || workbook::run_task(call, policy, observer, seed))
        .await;
    spinner.finish_and_clear();

    let result = match outcome {
        SessionOutcome::Completed(took) => {
            output::success(&format!("Completed: {}", name));
            output::kv("Duration", &format!("{:.2}s", took.as_secs_f64()));
            Ok(())
        }
        SessionOutcome::Failed(err) => {
            output::error("Error occurred. See log for details.");
            if let Some(path) = coordinator.last_report() {
                output::kv("Log", &path.display().to_string());
            }
            Err(anyhow!("{} failed: {}", name, err))
        }
        SessionOutcome::Aborted => {
            output::warning(&format!(
                "Workbook {} is not available; {} did not complete",
                args.workbook, name
            ));
            Ok(())
        }
    };

    let detached = coordinator
        .reap(config.coordinator.abandon_join_timeout())
        .await;
    if detached > 0 {
        tracing::debug!(count = detached, "exiting with detached workers");
    }

    result
}
